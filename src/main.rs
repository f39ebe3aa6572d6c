use calendar_tools::startup;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting calendar tools");

    // Load configuration
    let config = startup::load_config()?;

    #[cfg(feature = "tool-server")]
    {
        startup::start_server(config).await
    }

    #[cfg(not(feature = "tool-server"))]
    {
        let _ = config;
        tracing::warn!("Tool server feature not enabled. Please compile with --features tool-server");
        Ok(())
    }
}
