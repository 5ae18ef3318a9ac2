//! Process signal handling.
//!
//! SIGINT and SIGTERM (Ctrl+C on Windows) request a graceful shutdown. SIGHUP
//! requests a reload on Unix and never fires elsewhere.

use tokio::signal;
use tracing::info;

/// Returns once a termination signal is received.
pub async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("📡 Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        info!("📡 Received Ctrl+C");
    }

    Ok(())
}

/// Stream of reload requests.
pub struct ReloadSignal {
    #[cfg(unix)]
    hangup: signal::unix::Signal,
}

impl ReloadSignal {
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};
            Ok(Self {
                hangup: signal(SignalKind::hangup())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Waits for the next reload request.
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if self.hangup.recv().await.is_some() {
                info!("📡 Received SIGHUP");
                return;
            }
        }

        std::future::pending::<()>().await
    }
}
