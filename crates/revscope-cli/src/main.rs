//! # revscope CLI
//!
//! Command-line front end for the review-target resolver.
//!
//! `revscope resolve` classifies one argument and prints the resulting target
//! as JSON. `revscope session ...` drives the compute-once session cache used
//! by multi-step review workflows. `revscope debug ...` and
//! `revscope config show` are maintenance commands.
//!
//! Machine-readable output goes to stdout; logs go to stderr.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
