//! Lifecycle coordinator and the fail-fast abort path.
//!
//! ```text
//! Uninitialized -> ConfigurationsLoaded -> ModulesLoaded -> DependenciesAttached -> Running -> Disabled
//!        \________________\_____________________\______________________\
//!                                                                        -> Aborted
//! ```
//!
//! `Running` accepts any number of reload and sync requests. `Disabled` and
//! `Aborted` are terminal: a new coordinator has to be built to run again.

use crate::catalog::UnitCatalog;
use crate::configuration::ConfigurationRegistry;
use crate::context::{HostContext, HostPlatform};
use crate::dependency::DependencyBroker;
use crate::error::{CoreError, CriticalFault};
use crate::messaging::DEFAULT_PROXY_CHANNEL;
use crate::module::{ModuleRegistry, PhaseReport};
use crate::scheduler::SyncExecutor;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where the core is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    ConfigurationsLoaded,
    ModulesLoaded,
    DependenciesAttached,
    Running,
    Disabled,
    Aborted,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Disabled | LifecycleState::Aborted)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninitialized => write!(f, "uninitialized"),
            LifecycleState::ConfigurationsLoaded => write!(f, "configurations loaded"),
            LifecycleState::ModulesLoaded => write!(f, "modules loaded"),
            LifecycleState::DependenciesAttached => write!(f, "dependencies attached"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Disabled => write!(f, "disabled"),
            LifecycleState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Options for building a [`LifecycleCoordinator`].
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Channel proxy method frames are sent on.
    pub proxy_channel: String,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            proxy_channel: DEFAULT_PROXY_CHANNEL.to_string(),
        }
    }
}

/// State shared between the coordinator and every [`HostContext`].
///
/// Registries are installed once, in load order, and only read afterwards.
pub(crate) struct CoreShared {
    host: Arc<dyn HostPlatform>,
    catalog: UnitCatalog,
    proxy_channel: String,
    state: Mutex<LifecycleState>,
    fault: OnceCell<CriticalFault>,
    configurations: OnceCell<ConfigurationRegistry>,
    modules: OnceCell<ModuleRegistry>,
    dependencies: OnceCell<DependencyBroker>,
    executor: SyncExecutor,
    phase_lock: Mutex<()>,
    modules_disabled: AtomicBool,
}

impl CoreShared {
    pub(crate) fn host(&self) -> &Arc<dyn HostPlatform> {
        &self.host
    }

    pub(crate) fn proxy_channel(&self) -> &str {
        &self.proxy_channel
    }

    pub(crate) fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    pub(crate) fn configurations(&self) -> Option<&ConfigurationRegistry> {
        self.configurations.get()
    }

    pub(crate) fn modules(&self) -> Option<&ModuleRegistry> {
        self.modules.get()
    }

    pub(crate) fn dependencies(&self) -> Option<&DependencyBroker> {
        self.dependencies.get()
    }

    fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn advance(&self, next: LifecycleState) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if *state == LifecycleState::Aborted {
            return Err(self.aborted());
        }
        debug!("Core state: {} -> {}", *state, next);
        *state = next;
        Ok(())
    }

    fn aborted(&self) -> CoreError {
        let cause = self
            .fault
            .get()
            .map(|fault| fault.cause().to_string())
            .unwrap_or_default();
        CoreError::Aborted(cause)
    }

    /// Moves the core to `Aborted` and deactivates the host integration.
    ///
    /// Only the first fault is acted upon.
    pub(crate) fn abort(&self, fault: CriticalFault) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                debug!("Ignoring critical error while {}: {}", *state, fault);
                return;
            }
            *state = LifecycleState::Aborted;
        }

        error!("A critical error was encountered! Stopping the core");
        error!("{}", fault);

        let fault = self.fault.get_or_init(|| fault);
        self.host.deactivate_integration(fault);
    }
}

/// Drives the registries through the lifecycle sequence.
///
/// The coordinator owns the core. Contexts handed to units only hold it
/// weakly, so dropping the coordinator releases every unit.
pub struct LifecycleCoordinator {
    shared: Arc<CoreShared>,
}

impl LifecycleCoordinator {
    pub fn new(catalog: UnitCatalog, host: Arc<dyn HostPlatform>, options: CoreOptions) -> Self {
        Self {
            shared: Arc::new(CoreShared {
                host,
                catalog,
                proxy_channel: options.proxy_channel,
                state: Mutex::new(LifecycleState::Uninitialized),
                fault: OnceCell::new(),
                configurations: OnceCell::new(),
                modules: OnceCell::new(),
                dependencies: OnceCell::new(),
                executor: SyncExecutor::new(),
                phase_lock: Mutex::new(()),
                modules_disabled: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    /// The fault that aborted the core, if any.
    pub fn fault(&self) -> Option<&CriticalFault> {
        self.shared.fault.get()
    }

    /// A context handle not tagged with any unit.
    pub fn context(&self) -> HostContext {
        HostContext::new(Arc::downgrade(&self.shared))
    }

    pub fn configurations(&self) -> Option<&ConfigurationRegistry> {
        self.shared.configurations()
    }

    pub fn modules(&self) -> Option<&ModuleRegistry> {
        self.shared.modules()
    }

    pub fn dependencies(&self) -> Option<&DependencyBroker> {
        self.shared.dependencies()
    }

    /// Looks up a configuration unit. A miss aborts the core.
    pub fn configuration<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CoreError> {
        self.context().configuration::<T>()
    }

    /// Looks up a module. A miss aborts the core.
    pub fn module<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CoreError> {
        self.context().module::<T>()
    }

    /// Runs the forward chain up to `Running`.
    ///
    /// Any failure aborts the whole core: the cause is logged, the host
    /// deactivates the integration and the error is returned.
    pub fn enable(&self) -> Result<(), CoreError> {
        let _phase = self.shared.phase_lock.lock();
        self.expect_state("enable", LifecycleState::Uninitialized)?;

        info!("Enabling core");
        self.shared.host.register_outgoing_channel(&self.shared.proxy_channel);

        match self.run_enable() {
            Ok(()) => {
                info!("Core enabled");
                Ok(())
            }
            Err(e) => {
                self.shared.abort(CriticalFault::from(&e));
                Err(e)
            }
        }
    }

    fn run_enable(&self) -> Result<(), CoreError> {
        let shared = &self.shared;
        let context = self.context();

        let configurations = ConfigurationRegistry::load_all(&shared.catalog, &context)?;
        let configurations = shared.configurations.get_or_init(|| configurations);
        configurations.late_init()?;
        shared.advance(LifecycleState::ConfigurationsLoaded)?;

        let modules = ModuleRegistry::load_all(&shared.catalog, configurations, &context)?;
        let modules = shared.modules.get_or_init(|| modules);
        shared.advance(LifecycleState::ModulesLoaded)?;

        let dependencies = DependencyBroker::attach_all(shared.catalog.dependencies(), shared.host.as_ref());
        info!("Attached {} dependencies", dependencies.len());
        shared.dependencies.get_or_init(|| dependencies);
        shared.advance(LifecycleState::DependenciesAttached)?;

        modules.late_init()?;
        shared.advance(LifecycleState::Running)
    }

    /// Reloads every configuration, then every module.
    ///
    /// A configuration that fails to reload aborts the core. Module reload
    /// failures are collected in the returned report.
    pub fn reload(&self) -> Result<PhaseReport, CoreError> {
        let _phase = self.shared.phase_lock.lock();
        self.expect_state("reload", LifecycleState::Running)?;

        self.reload_configurations_locked()?;
        let report = self.running_modules()?.reload_all();
        info!("Reloaded {} modules", report.invoked);
        self.still_running(report)
    }

    /// Reloads configuration units only.
    pub fn reload_configurations(&self) -> Result<(), CoreError> {
        let _phase = self.shared.phase_lock.lock();
        self.expect_state("reload configurations", LifecycleState::Running)?;
        self.reload_configurations_locked()
    }

    fn reload_configurations_locked(&self) -> Result<(), CoreError> {
        let configurations = self
            .shared
            .configurations()
            .ok_or_else(|| self.invalid("reload"))?;

        configurations.reload_all().inspect_err(|e| {
            self.shared.abort(CriticalFault::from(e));
        })
    }

    /// Pushes every module's state to its synchronization point.
    pub fn sync(&self) -> Result<PhaseReport, CoreError> {
        let _phase = self.shared.phase_lock.lock();
        self.expect_state("sync", LifecycleState::Running)?;
        let report = self.running_modules()?.sync_all();
        self.still_running(report)
    }

    /// Disables every module and moves the core to `Disabled`.
    ///
    /// Every module is disabled exactly once, even if some fail. After an
    /// abort the modules that were built are still disabled once, but the
    /// core stays `Aborted`.
    pub fn disable(&self) -> Result<PhaseReport, CoreError> {
        let _phase = self.shared.phase_lock.lock();
        if self.state() == LifecycleState::Aborted {
            return self.disable_after_abort();
        }
        self.expect_state("disable", LifecycleState::Running)?;

        info!("Disabling core");
        let report = self.disable_modules(self.running_modules()?);
        self.shared.advance(LifecycleState::Disabled)?;
        info!("Core disabled");
        Ok(report)
    }

    fn disable_after_abort(&self) -> Result<PhaseReport, CoreError> {
        let modules = match self.shared.modules() {
            Some(modules) if !self.shared.modules_disabled.load(Ordering::SeqCst) => modules,
            _ => return Err(self.shared.aborted()),
        };

        info!("Disabling {} modules of the aborted core", modules.len());
        Ok(self.disable_modules(modules))
    }

    fn disable_modules(&self, modules: &ModuleRegistry) -> PhaseReport {
        self.shared.modules_disabled.store(true, Ordering::SeqCst);
        let report = modules.disable_all();
        if !report.is_clean() {
            warn!("{} modules failed to disable cleanly", report.failures.len());
        }
        report
    }

    /// Turns a finished phase into an error if a unit aborted the core
    /// while it ran.
    fn still_running(&self, report: PhaseReport) -> Result<PhaseReport, CoreError> {
        match self.state() {
            LifecycleState::Aborted => Err(self.shared.aborted()),
            _ => Ok(report),
        }
    }

    fn running_modules(&self) -> Result<&ModuleRegistry, CoreError> {
        self.shared.modules().ok_or_else(|| self.invalid("dispatch"))
    }

    fn expect_state(&self, operation: &'static str, expected: LifecycleState) -> Result<(), CoreError> {
        match self.state() {
            state if state == expected => Ok(()),
            LifecycleState::Aborted => Err(self.shared.aborted()),
            _ => Err(self.invalid(operation)),
        }
    }

    fn invalid(&self, operation: &'static str) -> CoreError {
        CoreError::InvalidTransition {
            operation,
            state: self.state(),
        }
    }
}

impl fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("state", &self.state())
            .field("proxy_channel", &self.shared.proxy_channel)
            .finish()
    }
}
