//! Stand-alone console host.
//!
//! Runs the core outside of a game server: there are no end-user sessions, no
//! external systems are ever active, and console commands are only logged.

use async_trait::async_trait;
use essentials_core::{CriticalFault, DependencyProbe, HostError, HostPlatform, Session};
use parking_lot::Mutex;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

pub struct ConsoleHost {
    data_directory: PathBuf,
    channels: Mutex<Vec<String>>,
    fault: Mutex<Option<CriticalFault>>,
    deactivated: Notify,
}

impl ConsoleHost {
    pub fn new(data_directory: PathBuf) -> Self {
        Self {
            data_directory,
            channels: Mutex::new(Vec::new()),
            fault: Mutex::new(None),
            deactivated: Notify::new(),
        }
    }

    /// Returns once the integration has been deactivated by a critical fault.
    pub async fn deactivated(&self) -> CriticalFault {
        loop {
            let notified = self.deactivated.notified();
            if let Some(fault) = self.fault.lock().clone() {
                return fault;
            }
            notified.await;
        }
    }
}

impl DependencyProbe for ConsoleHost {
    fn is_system_active(&self, _system: &str) -> bool {
        false
    }

    fn load_capability(&self, _system: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

#[async_trait]
impl HostPlatform for ConsoleHost {
    fn dispatch_console_command(&self, command: &str) -> Result<(), HostError> {
        info!("💻 Console: {}", command);
        Ok(())
    }

    fn online_sessions(&self) -> Vec<Arc<dyn Session>> {
        Vec::new()
    }

    fn register_outgoing_channel(&self, channel: &str) {
        debug!("Registered outgoing channel {}", channel);
        self.channels.lock().push(channel.to_string());
    }

    async fn send_channel_message(
        &self,
        session: Arc<dyn Session>,
        channel: &str,
        _payload: &[u8],
    ) -> Result<(), HostError> {
        if !self.channels.lock().iter().any(|c| c == channel) {
            return Err(HostError::ChannelNotRegistered(channel.to_string()));
        }

        Err(HostError::Delivery {
            session: session.name(),
            reason: "the console host has no connected sessions".to_string(),
        })
    }

    fn deactivate_integration(&self, fault: &CriticalFault) {
        warn!("🛑 Deactivating integration: {}", fault);
        *self.fault.lock() = Some(fault.clone());
        self.deactivated.notify_waiters();
    }

    fn data_directory(&self) -> PathBuf {
        self.data_directory.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deactivation_wakes_waiter() {
        let host = Arc::new(ConsoleHost::new(PathBuf::from(".")));
        let waiter = {
            let host = host.clone();
            tokio::spawn(async move { host.deactivated().await })
        };
        tokio::task::yield_now().await;

        host.deactivate_integration(&CriticalFault::new("disk full"));

        let fault = waiter.await.unwrap();
        assert_eq!(fault.cause(), "disk full");
    }

    #[tokio::test]
    async fn test_deactivation_before_waiting_is_seen() {
        let host = ConsoleHost::new(PathBuf::from("."));
        host.deactivate_integration(&CriticalFault::new("disk full"));

        assert_eq!(host.deactivated().await.cause(), "disk full");
    }

    #[test]
    fn test_console_has_no_sessions_or_systems() {
        let host = ConsoleHost::new(PathBuf::from("data"));
        assert!(host.online_sessions().is_empty());
        assert!(!host.is_system_active("SecurityMaster"));
        assert_eq!(host.data_directory(), PathBuf::from("data"));
    }
}
