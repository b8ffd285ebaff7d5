use tokio::signal;

// Which signal stopped the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupt,
    Terminate,
}

impl StopReason {
    fn message(self) -> &'static str {
        match self {
            StopReason::Interrupt => "Shutting down Draw Things cache server (SIGINT)",
            StopReason::Terminate => "Draw Things cache server terminated (SIGTERM)",
        }
    }
}

// Handed to axum's graceful shutdown. Generations already running on their
// own tasks are not cancelled; they finish or time out.
pub async fn shutdown_signal() {
    let reason = wait_for_stop().await;
    tracing::info!(?reason, "{}", reason.message());
}

async fn wait_for_stop() -> StopReason {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => StopReason::Interrupt,
        () = terminate => StopReason::Terminate,
    }
}
