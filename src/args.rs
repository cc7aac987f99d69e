//! CLI surface for a stdio-framed, single-debuggee adapter: `--debug`,
//! `--log-file` and `--config` are the whole knob set.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Trace DAP traffic (requests/responses/events) to the log file.
    #[clap(long)]
    pub debug: bool,

    /// Log file for wire tracing (required if --debug is set; also
    /// honored as the ambient diagnostic log destination file if
    /// provided without --debug).
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Path to a `yadap.toml` config file overriding compiled-in
    /// defaults (overridden in turn by these flags).
    #[clap(long)]
    pub config: Option<PathBuf>,
}
