// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interactive questions on the terminal.

use std::io::{self, BufRead, Write};

use console::Term;

/// Interpret a yes/no answer; anything but `y`, `Y`, `n` or `N` is unclear
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim() {
        "y" | "Y" => Some(true),
        "n" | "N" => Some(false),
        _ => None,
    }
}

/// Ask `message` until a clear yes or no is read from `input`
///
/// End of input counts as no.
pub fn ask_yes_or_no<R: BufRead, W: Write>(input: &mut R, output: &mut W, message: &str) -> io::Result<bool> {
    loop {
        write!(output, "{message}\n(Y/N)? ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }

        match parse_answer(&line) {
            Some(answer) => return Ok(answer),
            None => writeln!(output, "Unclear input, expecting y/Y/n/N. Please try again.")?,
        }
    }
}

/// Ask `message` on the terminal until a clear yes or no comes back
pub fn yes_or_no(message: &str) -> io::Result<bool> {
    let term = Term::stdout();
    if !term.is_term() {
        return ask_yes_or_no(&mut io::stdin().lock(), &mut io::stdout(), message);
    }

    loop {
        term.write_str(&format!("{message}\n(Y/N)? "))?;
        let line = term.read_line()?;

        match parse_answer(&line) {
            Some(answer) => return Ok(answer),
            None => term.write_line("Unclear input, expecting y/Y/n/N. Please try again.")?,
        }
    }
}

/// Show `message` on the terminal and return the line typed in response
pub fn read_response(message: &str) -> io::Result<String> {
    let term = Term::stdout();
    term.write_str(message)?;
    term.read_line()
}
