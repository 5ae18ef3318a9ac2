//! Unit discovery through an explicit registration table.
//!
//! The host registers every configuration unit, feature unit and optional
//! dependency once at startup. Discovery is then a lookup over that table,
//! filtered by capability and namespace scope.

use crate::configuration::ConfigurationRegistry;
use crate::context::HostContext;
use crate::error::{ConstructionError, CoreError};
use crate::unit::{ConfigurationUnit, FeatureUnit, ModuleGate, Unit, UnitEntry, UnitType};
use std::any::{Any, TypeId};
use std::sync::Arc;

/// The capability a registered unit implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Configuration,
    Feature,
}

pub(crate) type ConfigurationFactory = Arc<
    dyn Fn(HostContext) -> Result<UnitEntry<dyn ConfigurationUnit>, ConstructionError>
        + Send
        + Sync,
>;

pub(crate) type FeatureFactory =
    Arc<dyn Fn(HostContext) -> Result<UnitEntry<dyn FeatureUnit>, ConstructionError> + Send + Sync>;

type GateLookup = fn(&ConfigurationRegistry) -> Result<Arc<dyn ModuleGate>, CoreError>;

#[derive(Clone)]
pub(crate) enum Factory {
    Configuration(ConfigurationFactory),
    Feature(FeatureFactory),
}

/// One row of the registration table.
#[derive(Clone)]
pub struct Registration {
    unit_type: UnitType,
    path: &'static str,
    factory: Factory,
}

impl Registration {
    pub fn unit_type(&self) -> UnitType {
        self.unit_type
    }

    /// Fully qualified Rust path of the unit type, used for scope filtering.
    pub fn path(&self) -> &'static str {
        self.path
    }

    pub fn capability(&self) -> Capability {
        match self.factory {
            Factory::Configuration(_) => Capability::Configuration,
            Factory::Feature(_) => Capability::Feature,
        }
    }

    pub(crate) fn factory(&self) -> &Factory {
        &self.factory
    }
}

/// An optional external system the core attaches to when it is active.
#[derive(Debug, Clone)]
pub struct DependencySpec {
    system: &'static str,
    capability: TypeId,
    capability_name: &'static str,
}

impl DependencySpec {
    pub fn new<T: Any + Send + Sync>(system: &'static str) -> Self {
        Self {
            system,
            capability: TypeId::of::<T>(),
            capability_name: std::any::type_name::<T>(),
        }
    }

    pub fn system(&self) -> &'static str {
        self.system
    }

    pub fn capability(&self) -> TypeId {
        self.capability
    }

    pub fn capability_name(&self) -> &'static str {
        self.capability_name
    }
}

/// Registration table consulted by the registries.
#[derive(Clone, Default)]
pub struct UnitCatalog {
    scope: String,
    registrations: Vec<Registration>,
    dependencies: Vec<DependencySpec>,
    gate: Option<GateLookup>,
}

impl UnitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits discovery to unit types whose path starts with `scope`.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn register_configuration<T>(&mut self) -> &mut Self
    where
        T: Unit + ConfigurationUnit,
    {
        let factory: ConfigurationFactory = Arc::new(
            |context: HostContext| -> Result<UnitEntry<dyn ConfigurationUnit>, ConstructionError> {
                let unit: Arc<T> = Arc::new(T::construct(context)?);
                let any: Arc<dyn Any + Send + Sync> = unit.clone();
                let erased: Arc<dyn ConfigurationUnit> = unit;
                Ok(UnitEntry::new(UnitType::of::<T>(), erased, any))
            },
        );

        self.registrations.push(Registration {
            unit_type: UnitType::of::<T>(),
            path: std::any::type_name::<T>(),
            factory: Factory::Configuration(factory),
        });
        self
    }

    pub fn register_module<T>(&mut self) -> &mut Self
    where
        T: Unit + FeatureUnit,
    {
        let factory: FeatureFactory = Arc::new(
            |context: HostContext| -> Result<UnitEntry<dyn FeatureUnit>, ConstructionError> {
                let unit: Arc<T> = Arc::new(T::construct(context)?);
                let any: Arc<dyn Any + Send + Sync> = unit.clone();
                let erased: Arc<dyn FeatureUnit> = unit;
                Ok(UnitEntry::new(UnitType::of::<T>(), erased, any))
            },
        );

        self.registrations.push(Registration {
            unit_type: UnitType::of::<T>(),
            path: std::any::type_name::<T>(),
            factory: Factory::Feature(factory),
        });
        self
    }

    /// Declares an optional dependency on an external system.
    pub fn register_dependency<T: Any + Send + Sync>(&mut self, system: &'static str) -> &mut Self {
        self.dependencies.push(DependencySpec::new::<T>(system));
        self
    }

    /// Names the configuration unit whose enable flags gate module construction.
    ///
    /// Without a gate every discovered module is constructed.
    pub fn gate_modules_with<T>(&mut self) -> &mut Self
    where
        T: Unit + ConfigurationUnit + ModuleGate,
    {
        self.gate = Some(gate_lookup::<T>);
        self
    }

    /// Every registered unit implementing `capability` within `scope`.
    ///
    /// Returned in registration order. An empty result is not an error.
    pub fn discover(&self, capability: Capability, scope: &str) -> Vec<&Registration> {
        self.registrations
            .iter()
            .filter(|r| r.capability() == capability && r.path.starts_with(scope))
            .collect()
    }

    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    pub(crate) fn module_gate(
        &self,
        configurations: &ConfigurationRegistry,
    ) -> Result<Option<Arc<dyn ModuleGate>>, CoreError> {
        self.gate.map(|lookup| lookup(configurations)).transpose()
    }
}

fn gate_lookup<T>(configurations: &ConfigurationRegistry) -> Result<Arc<dyn ModuleGate>, CoreError>
where
    T: Unit + ConfigurationUnit + ModuleGate,
{
    let gate: Arc<dyn ModuleGate> = configurations.get::<T>()?;
    Ok(gate)
}
