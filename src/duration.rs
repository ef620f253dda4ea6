// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Format a number of seconds as a compact `1d2h3m4s` string
///
/// Zero components are left out; a zero duration renders as `0s`.
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / SECONDS_PER_DAY;
    let hours = (seconds % SECONDS_PER_DAY) / SECONDS_PER_HOUR;
    let minutes = (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let secs = seconds % SECONDS_PER_MINUTE;

    let mut result = String::new();
    for (value, unit) in [(days, 'd'), (hours, 'h'), (minutes, 'm'), (secs, 's')] {
        if value > 0 {
            result.push_str(&value.to_string());
            result.push(unit);
        }
    }

    if result.is_empty() {
        "0s".to_string()
    } else {
        result
    }
}

/// Format a signed `chrono` duration, clamping negative values to zero
pub fn format_time_delta(delta: chrono::TimeDelta) -> String {
    format_duration(delta.num_seconds().max(0) as u64)
}
