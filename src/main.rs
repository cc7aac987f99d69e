//! yadap - a Debug Adapter Protocol server for an embedded Lua debuggee.
//!
//! Speaks DAP over stdio: `Content-Length`-framed JSON in on stdin, framed
//! JSON out on stdout. Ambient diagnostics go to stderr only (via `log`),
//! never stdout, which is reserved for the protocol stream.

use std::io::{BufReader, BufWriter};
use std::process::ExitCode;

use clap::Parser;
use log::error;

use yadap::args::Args;
use yadap::config::Config;
use yadap::session::{self, Session};

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::resolve(&args) {
        Ok(c) => c,
        Err(e) => {
            env_logger::Builder::from_default_env().init();
            error!("failed to resolve configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut log_builder = env_logger::Builder::from_default_env();
    if let Some(filter) = &config.rust_log {
        log_builder.parse_filters(filter);
    }
    log_builder.init();

    let reader = BufReader::new(std::io::stdin());
    let writer = BufWriter::new(std::io::stdout());

    let result =
        Session::new(reader, writer, &config).and_then(|s| session::run(s).map_err(anyhow::Error::from));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("adapter ended with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
