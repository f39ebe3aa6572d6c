use crate::components::google_calendar::{
    CalendarBackend, CredentialProvider, GoogleCalendarClient, InMemoryCalendar, TokenManager,
};
use crate::config::{BackendKind, Config};
use crate::error::{CalendarResult, Error};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=warn,reqwest=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load the application config
pub fn load_config() -> miette::Result<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Create the calendar backend selected by the config
pub fn build_backend(config: &Config) -> CalendarResult<Arc<dyn CalendarBackend>> {
    match config.backend {
        BackendKind::Google => {
            info!(
                "Using Google Calendar '{}' with token file {}",
                config.google_calendar_id,
                config.token_file.display()
            );
            let credentials: Arc<dyn CredentialProvider> = Arc::new(TokenManager::new(config));
            Ok(Arc::new(GoogleCalendarClient::new(config, credentials)?))
        }
        BackendKind::Memory => {
            info!("Using in-memory calendar backend");
            Ok(Arc::new(InMemoryCalendar::new()))
        }
    }
}

/// Start the tool server and run it until a termination signal arrives
#[cfg(feature = "tool-server")]
pub async fn start_server(config: Config) -> miette::Result<()> {
    use crate::components::google_calendar::CalendarHandle;
    use crate::server::{self, AppState};
    use crate::shutdown;
    use crate::tools::CalendarTools;
    use tokio::sync::oneshot;

    let backend = build_backend(&config)?;
    let tools = CalendarTools::from_config(backend, &config);
    info!("Default timezone is {}", tools.default_timezone());

    let handle = CalendarHandle::new(tools);

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    // Spawn signal handler task
    tokio::spawn(shutdown::handle_signals(shutdown_send, handle.clone()));

    let state = AppState { handle };
    server::serve(&config.listen_addr, state, async move {
        let _ = shutdown_recv.await;
        info!("Received shutdown signal, stopping tool server...");
    })
    .await?;

    info!("Tool server stopped");
    Ok(())
}
