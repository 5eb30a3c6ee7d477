//! Telemetry agent entry point.

use telemetry_lib::cli::{self, Cli};
use telemetry_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
