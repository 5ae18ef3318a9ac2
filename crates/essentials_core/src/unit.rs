//! Unit capability traits and the type-erased entries the registries store.
//!
//! A unit is either a configuration unit or a feature unit (module). Every
//! unit type is registered exactly once and is keyed by its [`UnitType`].
//!
//! # Lifecycle
//!
//! 1. **Construction**: `Unit::construct` receives the [`HostContext`] and
//!    nothing else. Configuration units may already be read from here;
//!    sibling modules may not.
//! 2. **Late initialization**: called once after every unit of the same
//!    registry exists, so siblings can be looked up.
//! 3. **Reload / Sync**: repeatable while the core is running.
//! 4. **Disable**: called once at shutdown.

use crate::context::HostContext;
use crate::error::{ConstructionError, CoreError, UnitError, UnitKind};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Stable identity of a registered unit implementation.
///
/// Equality and hashing use the Rust type identity only; the name is what the
/// operator sees in logs and what module enable flags are keyed by.
#[derive(Debug, Clone, Copy)]
pub struct UnitType {
    id: TypeId,
    name: &'static str,
}

impl UnitType {
    pub fn of<T: Unit>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for UnitType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UnitType {}

impl Hash for UnitType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// One step of the fixed lifecycle sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Load,
    LateInitialization,
    Reload,
    Sync,
    Disable,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Load => write!(f, "load"),
            Phase::LateInitialization => write!(f, "late initialization"),
            Phase::Reload => write!(f, "reload"),
            Phase::Sync => write!(f, "sync"),
            Phase::Disable => write!(f, "disable"),
        }
    }
}

/// A constructible unit type.
///
/// `NAME` identifies the unit in logs and is the key used to look up a
/// module's enable flag.
pub trait Unit: Any + Send + Sync + Sized {
    const NAME: &'static str;

    /// Builds the unit. The context is the only constructor argument.
    fn construct(context: HostContext) -> Result<Self, ConstructionError>;
}

/// One logical configuration domain.
///
/// Implementations own their on-disk representation and keep the loaded state
/// behind interior mutability, so a reload replaces state without replacing the
/// registry entry.
pub trait ConfigurationUnit: Send + Sync + 'static {
    /// Loads (or reloads) the backing file.
    fn load_file(&self) -> Result<(), UnitError>;

    /// Cross-unit setup. Every sibling configuration is present by now.
    fn on_late_initialization(&self) -> Result<(), UnitError> {
        Ok(())
    }
}

/// One pluggable feature.
pub trait FeatureUnit: Send + Sync + 'static {
    fn on_late_initialization(&self) -> Result<(), UnitError> {
        Ok(())
    }

    fn on_reload(&self) -> Result<(), UnitError> {
        Ok(())
    }

    fn on_sync(&self) -> Result<(), UnitError> {
        Ok(())
    }

    fn on_disable(&self) -> Result<(), UnitError> {
        Ok(())
    }
}

/// Implemented by the configuration unit that decides which modules run.
pub trait ModuleGate: Send + Sync + 'static {
    /// Returns whether the module registered under `module` is enabled.
    fn module_state(&self, module: &str) -> bool;
}

/// A constructed unit together with a handle used for typed lookups.
pub(crate) struct UnitEntry<U: ?Sized> {
    pub unit_type: UnitType,
    pub unit: Arc<U>,
    any: Arc<dyn Any + Send + Sync>,
}

impl<U: ?Sized> UnitEntry<U> {
    pub fn new(unit_type: UnitType, unit: Arc<U>, any: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            unit_type,
            unit,
            any,
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.any.clone().downcast::<T>().ok()
    }
}

/// Converts a caught panic payload into a readable message.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("unit panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("unit panicked: {}", s)
    } else {
        "unit panicked with unknown error".to_string()
    }
}

/// Runs a unit constructor, mapping errors and panics to a construction error.
pub(crate) fn construct_guarded<U: ?Sized>(
    kind: UnitKind,
    unit_type: UnitType,
    construct: impl FnOnce() -> Result<UnitEntry<U>, ConstructionError>,
) -> Result<UnitEntry<U>, CoreError> {
    let outcome = match catch_unwind(AssertUnwindSafe(construct)) {
        Ok(result) => result,
        Err(payload) => Err(ConstructionError::invocation(panic_message(payload))),
    };

    outcome.map_err(|e| CoreError::Construction {
        kind,
        unit: unit_type.name().to_string(),
        failure: e.failure,
        message: e.message,
    })
}

/// Runs one phase operation on one unit, mapping errors and panics to a phase
/// error for that unit.
pub(crate) fn run_phase(
    kind: UnitKind,
    unit_type: UnitType,
    phase: Phase,
    operation: impl FnOnce() -> Result<(), UnitError>,
) -> Result<(), CoreError> {
    let outcome = match catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => result,
        Err(payload) => Err(UnitError::failed(panic_message(payload))),
    };

    outcome.map_err(|source| CoreError::Phase {
        kind,
        unit: unit_type.name().to_string(),
        phase,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    impl Unit for Alpha {
        const NAME: &'static str = "Alpha";

        fn construct(_context: HostContext) -> Result<Self, ConstructionError> {
            Ok(Alpha)
        }
    }

    impl Unit for Beta {
        const NAME: &'static str = "Alpha";

        fn construct(_context: HostContext) -> Result<Self, ConstructionError> {
            Ok(Beta)
        }
    }

    #[test]
    fn test_unit_type_identity_ignores_name() {
        assert_eq!(UnitType::of::<Alpha>(), UnitType::of::<Alpha>());
        assert_ne!(UnitType::of::<Alpha>(), UnitType::of::<Beta>());
        assert_eq!(UnitType::of::<Alpha>().to_string(), "Alpha");
    }

    #[test]
    fn test_run_phase_catches_panics() {
        let result = run_phase(UnitKind::Module, UnitType::of::<Alpha>(), Phase::Sync, || {
            panic!("sync exploded")
        });

        match result {
            Err(CoreError::Phase { phase, source, .. }) => {
                assert_eq!(phase, Phase::Sync);
                assert!(source.to_string().contains("sync exploded"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_constructor_panic_is_invocation_failure() {
        let result: Result<UnitEntry<dyn FeatureUnit>, CoreError> =
            construct_guarded(UnitKind::Module, UnitType::of::<Alpha>(), || {
                panic!("constructor exploded")
            });

        match result {
            Err(CoreError::Construction { failure, .. }) => {
                assert_eq!(failure, crate::error::ConstructionFailure::Invocation)
            }
            _ => panic!("expected a construction error"),
        }
    }
}
