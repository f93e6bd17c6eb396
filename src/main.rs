// cb: a tree-walking interpreter for the Cb language.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::env::args;
use std::fs;
use std::process::ExitCode;

use cb::diagnostics::{NullSink, SourceLocation, StderrSink, TraceSink};

/// `cb <source.cb> [--debug]` (spec §6.1). Opens the file, parses it,
/// and hands the AST to the evaluator; `--debug` swaps the trace sink
/// from a no-op to one that prints to stderr. No other flags exist.
fn main() -> ExitCode {
    let mut argv = args().skip(1);
    let path = match argv.next() {
        Some(p) => p,
        None => {
            eprintln!("usage: cb <source.cb> [--debug]");
            return ExitCode::FAILURE;
        }
    };
    let debug = argv.any(|a| a == "--debug");

    let source = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cb: cannot read '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let program = match cb::parser::parse(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut stderr_sink = StderrSink;
    let mut null_sink = NullSink;
    let trace: &mut dyn TraceSink = if debug { &mut stderr_sink } else { &mut null_sink };
    let mut stdout = std::io::stdout();

    match cb::driver::run(&path, &program, trace, &mut stdout) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code.rem_euclid(256) as u8),
        Err(e) => {
            eprintln!("{}", e.render(&path, SourceLocation::unknown()));
            ExitCode::FAILURE
        }
    }
}
