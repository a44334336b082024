use clap::Parser;
use presentation::cli::{Cli, CliApp};
use shared::telemetry::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let app = CliApp::new(&cli)?;
    app.run(cli).await?;
    Ok(())
}
