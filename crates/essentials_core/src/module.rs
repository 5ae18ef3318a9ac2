//! Registry of feature units (modules).
//!
//! Construction is gated per module by the enable flags of the catalog's gate
//! configuration. Load and late initialization are fatal on failure; reload,
//! sync and disable are best-effort and keep going past a failing module.

use crate::catalog::{Capability, Factory, UnitCatalog};
use crate::configuration::ConfigurationRegistry;
use crate::context::HostContext;
use crate::error::{CoreError, UnitKind};
use crate::unit::{construct_guarded, run_phase, FeatureUnit, Phase, UnitEntry, UnitType};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of a best-effort phase run across all modules.
#[derive(Debug)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Number of modules the phase operation was invoked on.
    pub invoked: usize,
    pub failures: Vec<CoreError>,
}

impl PhaseReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            invoked: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns exactly one instance per enabled module type.
pub struct ModuleRegistry {
    entries: Vec<UnitEntry<dyn FeatureUnit>>,
    index: HashMap<TypeId, usize>,
    skipped: Vec<UnitType>,
}

impl ModuleRegistry {
    /// Constructs every enabled module in the catalog's scope.
    ///
    /// A module whose enable flag is off is skipped and never exists for the
    /// rest of this run.
    pub(crate) fn load_all(
        catalog: &UnitCatalog,
        configurations: &ConfigurationRegistry,
        context: &HostContext,
    ) -> Result<Self, CoreError> {
        let gate = catalog.module_gate(configurations)?;
        let mut registry = Self {
            entries: Vec::new(),
            index: HashMap::new(),
            skipped: Vec::new(),
        };

        for registration in catalog.discover(Capability::Feature, catalog.scope()) {
            let unit_type = registration.unit_type();
            let Factory::Feature(factory) = registration.factory() else {
                continue;
            };

            if let Some(gate) = &gate {
                if !gate.module_state(unit_type.name()) {
                    info!("Module {} is disabled, skipping", unit_type);
                    registry.skipped.push(unit_type);
                    continue;
                }
            }

            if registry.index.contains_key(&unit_type.id()) {
                return Err(CoreError::Duplicate {
                    kind: UnitKind::Module,
                    unit: unit_type.name().to_string(),
                });
            }

            debug!("Constructing module: {}", unit_type);
            let unit_context = context.for_unit(unit_type.name());
            let entry = construct_guarded(UnitKind::Module, unit_type, || {
                (**factory)(unit_context)
            })?;

            registry.index.insert(unit_type.id(), registry.entries.len());
            registry.entries.push(entry);
        }

        info!(
            "Loaded {} modules ({} disabled)",
            registry.entries.len(),
            registry.skipped.len()
        );
        Ok(registry)
    }

    /// Calls every module's late-initialization hook. Failures are fatal.
    pub(crate) fn late_init(&self) -> Result<(), CoreError> {
        for entry in &self.entries {
            run_phase(
                UnitKind::Module,
                entry.unit_type,
                Phase::LateInitialization,
                || entry.unit.on_late_initialization(),
            )?;
        }
        Ok(())
    }

    pub fn reload_all(&self) -> PhaseReport {
        self.dispatch(Phase::Reload, |unit| unit.on_reload())
    }

    /// Pushes each module's current state to its synchronization point.
    pub fn sync_all(&self) -> PhaseReport {
        self.dispatch(Phase::Sync, |unit| unit.on_sync())
    }

    /// Disables every module. Shutdown always completes: a failing module is
    /// logged and the remaining modules are still disabled.
    pub fn disable_all(&self) -> PhaseReport {
        self.dispatch(Phase::Disable, |unit| unit.on_disable())
    }

    fn dispatch<F>(&self, phase: Phase, operation: F) -> PhaseReport
    where
        F: Fn(&dyn FeatureUnit) -> Result<(), crate::error::UnitError>,
    {
        let mut report = PhaseReport::new(phase);

        for entry in &self.entries {
            report.invoked += 1;
            if let Err(e) = run_phase(UnitKind::Module, entry.unit_type, phase, || {
                operation(entry.unit.as_ref())
            }) {
                error!("Error during {} of module {}: {}", phase, entry.unit_type, e);
                report.failures.push(e);
            }
        }

        report
    }

    /// Returns the registered instance of `T`, or [`CoreError::NotFound`]
    /// for disabled and unregistered modules alike.
    pub(crate) fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CoreError> {
        self.index
            .get(&TypeId::of::<T>())
            .and_then(|&i| self.entries[i].downcast::<T>())
            .ok_or_else(|| CoreError::not_found::<T>(UnitKind::Module))
    }

    pub fn contains(&self, unit_type: UnitType) -> bool {
        self.index.contains_key(&unit_type.id())
    }

    /// Registered module types in load order.
    pub fn unit_types(&self) -> Vec<UnitType> {
        self.entries.iter().map(|e| e.unit_type).collect()
    }

    /// Module types skipped because their enable flag was off.
    pub fn disabled(&self) -> &[UnitType] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
