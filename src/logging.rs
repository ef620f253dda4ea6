// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding tracing directives, e.g. `podprep=debug`
pub const LOG_ENV: &str = "PODPREP_LOG";

/// Install the global subscriber writing compact lines to stderr
///
/// `PODPREP_LOG` wins when it parses; otherwise the level follows `verbose`.
pub fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(build_env_filter(verbose))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .compact(),
        )
        .init();
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }

    EnvFilter::new(default_level(verbose))
}

fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}
