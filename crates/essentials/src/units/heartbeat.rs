//! Announces this server to the proxy on every synchronization.

use super::common::CommonConfiguration;
use essentials_core::{ConstructionError, FeatureUnit, HostContext, LogLevel, Unit, UnitError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize)]
struct Beat {
    server_type: String,
    sequence: u64,
    sessions: usize,
}

pub struct Heartbeat {
    context: HostContext,
    sequence: AtomicU64,
    /// Beats handed to the runtime and not yet known to be delivered.
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Heartbeat {
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Waits until every beat sent so far has been delivered or has failed.
    pub async fn flush(&self) {
        let pending: Vec<_> = self.in_flight.lock().drain(..).collect();
        for handle in pending {
            if let Err(e) = handle.await {
                self.context.log(LogLevel::Warn, &format!("Heartbeat task failed: {}", e));
            }
        }
    }
}

impl Unit for Heartbeat {
    const NAME: &'static str = "Heartbeat";

    fn construct(context: HostContext) -> Result<Self, ConstructionError> {
        Ok(Self {
            context,
            sequence: AtomicU64::new(0),
            in_flight: Mutex::new(Vec::new()),
        })
    }
}

impl FeatureUnit for Heartbeat {
    fn on_sync(&self) -> Result<(), UnitError> {
        let runtime = Handle::try_current().map_err(|e| UnitError::failed(e.to_string()))?;
        let common = self.context.configuration::<CommonConfiguration>()?;

        let beat = Beat {
            server_type: common.server_type().to_string(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            sessions: self.context.online_sessions().len(),
        };
        let payload = serde_json::to_string(&beat).map_err(|e| UnitError::invalid_data(e.to_string()))?;

        let context = self.context.clone();
        let handle = runtime.spawn(async move {
            if let Err(e) = context.invoke_proxy_method(Heartbeat::NAME, "beat", &[payload.as_str()]).await {
                context.log(LogLevel::Warn, &format!("Heartbeat not sent: {}", e));
            }
        });

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|pending| !pending.is_finished());
        in_flight.push(handle);
        Ok(())
    }

    fn on_disable(&self) -> Result<(), UnitError> {
        let pending = self
            .in_flight
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count();
        if pending > 0 {
            self.context.log(
                LogLevel::Warn,
                &format!("{} heartbeats were still in flight when disabled", pending),
            );
        }

        self.context.log(
            LogLevel::Info,
            &format!("Stopped after {} heartbeats", self.sequence()),
        );
        Ok(())
    }
}
