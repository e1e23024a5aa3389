use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Installs SIGINT/SIGTERM handlers that cancel the run cooperatively:
/// no new jobs are dispatched, in-flight counters kill their subprocess,
/// and results already observed are still written.
pub fn register_handlers(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install SIGINT handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }

        cancel.cancel();
    });
}
