mod cli;
mod error;
pub(crate) mod git;
mod io_utils;
mod logging;
pub(crate) mod serde_helpers;
pub(crate) mod time_utils;

pub(crate) use error::{AppError, AppResult};

use std::process::ExitCode;

use clap::{ColorChoice, Parser};
use tracing::error;

use crate::cli::{Cli, GetVerbosity};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logger(
        cli.cmd.get_verbosity().tracing_level_filter(),
        cli.color != ColorChoice::Never,
    );
    match cli.cmd.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
