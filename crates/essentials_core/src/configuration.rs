//! Registry of configuration units.
//!
//! Populated before any module is constructed, because module gating and
//! module constructors read configuration.

use crate::catalog::{Capability, Factory, UnitCatalog};
use crate::context::HostContext;
use crate::error::{CoreError, UnitKind};
use crate::unit::{construct_guarded, run_phase, ConfigurationUnit, Phase, UnitEntry, UnitType};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Owns exactly one instance per configuration unit type.
pub struct ConfigurationRegistry {
    entries: Vec<UnitEntry<dyn ConfigurationUnit>>,
    index: HashMap<TypeId, usize>,
}

impl ConfigurationRegistry {
    /// Constructs and loads every configuration unit in the catalog's scope.
    ///
    /// Any construction or load failure is fatal: later units may depend on
    /// the failing one existing.
    pub(crate) fn load_all(catalog: &UnitCatalog, context: &HostContext) -> Result<Self, CoreError> {
        let mut registry = Self {
            entries: Vec::new(),
            index: HashMap::new(),
        };

        for registration in catalog.discover(Capability::Configuration, catalog.scope()) {
            let unit_type = registration.unit_type();
            let Factory::Configuration(factory) = registration.factory() else {
                continue;
            };

            if registry.index.contains_key(&unit_type.id()) {
                return Err(CoreError::Duplicate {
                    kind: UnitKind::Configuration,
                    unit: unit_type.name().to_string(),
                });
            }

            debug!("Constructing configuration: {}", unit_type);
            let unit_context = context.for_unit(unit_type.name());
            let entry = construct_guarded(UnitKind::Configuration, unit_type, || {
                (**factory)(unit_context)
            })?;

            load_file(&entry, Phase::Load)?;

            registry.insert(entry);
        }

        info!("Loaded {} configurations", registry.len());
        Ok(registry)
    }

    fn insert(&mut self, entry: UnitEntry<dyn ConfigurationUnit>) {
        self.index.insert(entry.unit_type.id(), self.entries.len());
        self.entries.push(entry);
    }

    /// Calls every unit's late-initialization hook. Failures are fatal.
    pub(crate) fn late_init(&self) -> Result<(), CoreError> {
        for entry in &self.entries {
            run_phase(
                UnitKind::Configuration,
                entry.unit_type,
                Phase::LateInitialization,
                || entry.unit.on_late_initialization(),
            )?;
        }
        Ok(())
    }

    /// Reloads every registered unit in place.
    ///
    /// Entries are never replaced, so handles obtained through [`get`] stay
    /// valid and observe the refreshed state.
    ///
    /// [`get`]: ConfigurationRegistry::get
    pub fn reload_all(&self) -> Result<(), CoreError> {
        for entry in &self.entries {
            load_file(entry, Phase::Reload)?;
        }

        info!("Reloaded {} configurations", self.entries.len());
        Ok(())
    }

    /// Returns the registered instance of `T`, or [`CoreError::NotFound`].
    ///
    /// Raw lookup without the abort. Outside the crate lookups go through
    /// [`HostContext::configuration`](crate::HostContext::configuration).
    pub(crate) fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, CoreError> {
        self.index
            .get(&TypeId::of::<T>())
            .and_then(|&i| self.entries[i].downcast::<T>())
            .ok_or_else(|| CoreError::not_found::<T>(UnitKind::Configuration))
    }

    pub fn contains(&self, unit_type: UnitType) -> bool {
        self.index.contains_key(&unit_type.id())
    }

    /// Registered unit types in load order.
    pub fn unit_types(&self) -> Vec<UnitType> {
        self.entries.iter().map(|e| e.unit_type).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn load_file(entry: &UnitEntry<dyn ConfigurationUnit>, phase: Phase) -> Result<(), CoreError> {
    run_phase(UnitKind::Configuration, entry.unit_type, phase, || {
        entry.unit.load_file()
    })
    .map_err(|e| match e {
        CoreError::Phase { kind, unit, source, .. } => CoreError::Load { kind, unit, source },
        other => other,
    })
}
