//! Host context passed to every unit, and the host platform it wraps.
//!
//! The context is the only constructor argument a unit receives. It gives the
//! unit logging, typed lookup of configurations, modules and dependencies, the
//! fatal-abort trigger and a few host operations. It holds the core weakly, so
//! units that keep their context do not keep the core alive.

use crate::dependency::DependencyProbe;
use crate::error::{CoreError, CriticalFault, HostError, UnitKind};
use crate::lifecycle::CoreShared;
use crate::messaging::encode_proxy_frame;
use async_trait::async_trait;
use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Log levels available to units.
#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A live end-user session on the host.
pub trait Session: Send + Sync {
    fn id(&self) -> Uuid;
    fn name(&self) -> String;
    /// Client locale, e.g. `en_us`.
    fn locale(&self) -> String;
    /// Whether the session is still connected. Sessions may end at any time.
    fn is_online(&self) -> bool;
    fn send_message(&self, text: &str);
    fn kick(&self, reason: &str);
}

/// The host process the core is integrated into.
#[async_trait]
pub trait HostPlatform: DependencyProbe {
    /// Runs a command as the host console.
    fn dispatch_console_command(&self, command: &str) -> Result<(), HostError>;

    fn online_sessions(&self) -> Vec<Arc<dyn Session>>;

    /// Declares an outgoing out-of-band channel. Called once during enable.
    fn register_outgoing_channel(&self, channel: &str);

    async fn send_channel_message(
        &self,
        session: Arc<dyn Session>,
        channel: &str,
        payload: &[u8],
    ) -> Result<(), HostError>;

    /// Deactivates the whole integration after a fatal fault.
    ///
    /// Must not call back into the coordinator: it may run while a lifecycle
    /// phase is still in progress.
    fn deactivate_integration(&self, fault: &CriticalFault);

    /// Directory units keep their files in.
    fn data_directory(&self) -> PathBuf {
        PathBuf::from(".")
    }
}

/// Handle through which units reach the core and the host.
#[derive(Clone)]
pub struct HostContext {
    core: Weak<CoreShared>,
    unit: Option<&'static str>,
}

impl HostContext {
    pub(crate) fn new(core: Weak<CoreShared>) -> Self {
        Self { core, unit: None }
    }

    /// The same context, tagged with a unit name for logging.
    pub(crate) fn for_unit(&self, unit: &'static str) -> Self {
        Self {
            core: self.core.clone(),
            unit: Some(unit),
        }
    }

    fn core(&self) -> Result<Arc<CoreShared>, CoreError> {
        self.core.upgrade().ok_or(CoreError::ContextReleased)
    }

    /// Name of the unit this context was handed to, if any.
    pub fn unit_name(&self) -> Option<&'static str> {
        self.unit
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let unit = self.unit.unwrap_or("core");
        match level {
            LogLevel::Error => error!(unit = unit, "{}", message),
            LogLevel::Warn => warn!(unit = unit, "{}", message),
            LogLevel::Info => info!(unit = unit, "{}", message),
            LogLevel::Debug => debug!(unit = unit, "{}", message),
            LogLevel::Trace => trace!(unit = unit, "{}", message),
        }
    }

    /// Looks up a configuration unit.
    ///
    /// Available from module construction onwards and from configuration
    /// late initialization onwards. A miss aborts the core.
    pub fn configuration<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CoreError> {
        let core = self.core()?;
        match core.configurations() {
            Some(registry) => fatal_on_miss(&core, registry.get::<T>()),
            None => Err(CoreError::IllegalAccess {
                kind: UnitKind::Configuration,
                unit: std::any::type_name::<T>().to_string(),
            }),
        }
    }

    /// Looks up a module.
    ///
    /// Modules must not look up siblings while being constructed; the module
    /// registry is only readable from late initialization onwards. Looking up
    /// a disabled or unregistered module aborts the core.
    pub fn module<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CoreError> {
        let core = self.core()?;
        match core.modules() {
            Some(registry) => fatal_on_miss(&core, registry.get::<T>()),
            None => Err(CoreError::IllegalAccess {
                kind: UnitKind::Module,
                unit: std::any::type_name::<T>().to_string(),
            }),
        }
    }

    /// Looks up an optional dependency. `None` is a normal outcome.
    pub fn dependency<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.core
            .upgrade()
            .and_then(|core| core.dependencies().and_then(|broker| broker.get::<T>()))
    }

    /// Directory configuration units read their backing files from.
    pub fn data_directory(&self) -> Result<PathBuf, CoreError> {
        Ok(self.core()?.host().data_directory())
    }

    /// Asks the host whether the named external system is active right now.
    pub fn has_dependency(&self, system: &str) -> bool {
        self.core
            .upgrade()
            .map(|core| core.host().is_system_active(system))
            .unwrap_or(false)
    }

    /// Aborts the whole core. The cause is logged and the host deactivates
    /// the integration; no unit stays partially available.
    pub fn critical_error(&self, cause: impl Into<String>) {
        match self.core.upgrade() {
            Some(core) => core.abort(CriticalFault::new(cause)),
            None => error!("Critical error after the core was released: {}", cause.into()),
        }
    }

    /// Sessions currently connected to the host.
    pub fn online_sessions(&self) -> Vec<Arc<dyn Session>> {
        self.core
            .upgrade()
            .map(|core| core.host().online_sessions())
            .unwrap_or_default()
    }

    /// Moves the session into a permission group.
    ///
    /// Runs on the synchronization worker and does nothing if the session has
    /// ended by the time the job runs.
    pub fn set_permission_group(
        &self,
        session: Arc<dyn Session>,
        group: impl Into<String>,
    ) -> Result<(), CoreError> {
        let core = self.core()?;
        let host = core.host().clone();
        let group = group.into();

        core.executor().submit(move || {
            if !session.is_online() {
                debug!("Session {} went offline before its group change", session.id());
                return;
            }

            let commands = [
                format!("lp user {} parent set {}", session.name(), group),
                "lp sync".to_string(),
            ];
            for command in &commands {
                if let Err(e) = host.dispatch_console_command(command) {
                    warn!("Failed to run '{}': {}", command, e);
                }
            }
        })
    }

    /// Disconnects the session on the synchronization worker.
    pub fn kick_session(&self, session: Arc<dyn Session>, reason: impl Into<String>) -> Result<(), CoreError> {
        let core = self.core()?;
        let reason = reason.into();

        core.executor().submit(move || {
            if session.is_online() {
                session.kick(&reason);
            } else {
                debug!("Session {} already offline, not kicking", session.id());
            }
        })
    }

    /// Waits for every session job submitted so far to finish.
    pub async fn flush_session_jobs(&self) -> Result<(), CoreError> {
        let core = self.core()?;
        core.executor().flush().await
    }

    /// Invokes `unit.method(args)` on the proxy side.
    ///
    /// The frame is delivered to every online session on the proxy channel.
    /// Returns the number of sessions it was delivered to; zero sessions is
    /// not an error.
    pub async fn invoke_proxy_method(
        &self,
        unit: &str,
        method: &str,
        args: &[&str],
    ) -> Result<usize, CoreError> {
        let core = self.core()?;
        let payload = encode_proxy_frame(unit, method, args)?;

        let mut delivered = 0;
        for session in core.host().online_sessions() {
            let id = session.id();
            match core
                .host()
                .send_channel_message(session, core.proxy_channel(), &payload)
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to deliver {}.{} to {}: {}", unit, method, id, e),
            }
        }

        debug!("Proxy call {}.{} delivered to {} sessions", unit, method, delivered);
        Ok(delivered)
    }
}

fn fatal_on_miss<T>(core: &CoreShared, lookup: Result<Arc<T>, CoreError>) -> Result<Arc<T>, CoreError> {
    lookup.inspect_err(|e| {
        if matches!(e, CoreError::NotFound { .. }) {
            core.abort(CriticalFault::from(e));
        }
    })
}
