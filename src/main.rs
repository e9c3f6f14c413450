mod cmd;
mod core;
mod dns;
mod pool;
mod util;

use std::process::ExitCode;

use tracing::{Level, event};

use crate::cmd::cli::Cli;
use crate::core::konst::APP_NAME;

// Not async: the worker pool drives its own runtime and
// cannot be torn down from inside another one.
fn main() -> ExitCode {
    let cli = Cli::init();

    match cli.run() {
        Ok(_) => ExitCode::from(0),
        Err(e) => {
            // Alternate form keeps the context chain, e.g. which file failed.
            eprintln!("{e:#}");
            event!(target: APP_NAME, Level::ERROR, "{e:#}");
            ExitCode::from(1)
        }
    }
}
