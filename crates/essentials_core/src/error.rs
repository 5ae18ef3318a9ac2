//! Error taxonomy for the registry and lifecycle engine.
//!
//! Errors fall into two groups. Fatal errors (lookup-miss, construction
//! failure, load failure, duplicate registration) abort the whole core through
//! [`CriticalFault`]. Everything else is reported to the caller and leaves the
//! core running.

use crate::lifecycle::LifecycleState;
use crate::unit::Phase;
use std::fmt;

/// The registry a failing unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Configuration,
    Module,
    Dependency,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Configuration => write!(f, "configuration"),
            UnitKind::Module => write!(f, "module"),
            UnitKind::Dependency => write!(f, "dependency"),
        }
    }
}

/// The four ways constructing a unit can go wrong.
///
/// All four are fatal during load phases. The distinction is kept only so the
/// operator can tell from the log what kind of constructor problem occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionFailure {
    /// The constructor ran and reported that it could not build the unit.
    Instantiation,
    /// The constructor reached for something it may not touch yet, such as a
    /// sibling module that is only available after late initialization.
    IllegalAccess,
    /// The constructor panicked.
    Invocation,
    /// The unit does not provide the constructor the core expects.
    MissingConstructor,
}

impl fmt::Display for ConstructionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionFailure::Instantiation => write!(f, "instantiation failure"),
            ConstructionFailure::IllegalAccess => write!(f, "illegal construction access"),
            ConstructionFailure::Invocation => write!(f, "invocation failure"),
            ConstructionFailure::MissingConstructor => write!(f, "missing expected constructor"),
        }
    }
}

/// Error returned by a unit constructor.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{failure}: {message}")]
pub struct ConstructionError {
    pub failure: ConstructionFailure,
    pub message: String,
}

impl ConstructionError {
    pub fn new(failure: ConstructionFailure, message: impl Into<String>) -> Self {
        Self {
            failure,
            message: message.into(),
        }
    }

    pub fn instantiation(message: impl Into<String>) -> Self {
        Self::new(ConstructionFailure::Instantiation, message)
    }

    pub fn illegal_access(message: impl Into<String>) -> Self {
        Self::new(ConstructionFailure::IllegalAccess, message)
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        Self::new(ConstructionFailure::Invocation, message)
    }

    pub fn missing_constructor(message: impl Into<String>) -> Self {
        Self::new(ConstructionFailure::MissingConstructor, message)
    }
}

impl From<UnitError> for ConstructionError {
    fn from(error: UnitError) -> Self {
        Self::instantiation(error.to_string())
    }
}

impl From<CoreError> for ConstructionError {
    fn from(error: CoreError) -> Self {
        match &error {
            CoreError::IllegalAccess { .. } => Self::illegal_access(error.to_string()),
            _ => Self::instantiation(error.to_string()),
        }
    }
}

/// Error returned by a unit's own phase operations.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("{0}")]
    Failed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Core(Box<CoreError>),
}

impl UnitError {
    pub fn failed(message: impl Into<String>) -> Self {
        UnitError::Failed(message.into())
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        UnitError::InvalidData(message.into())
    }
}

impl From<CoreError> for UnitError {
    fn from(error: CoreError) -> Self {
        UnitError::Core(Box::new(error))
    }
}

/// Errors the host platform reports back to the core.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("command dispatch failed: {0}")]
    Command(String),
    #[error("channel {0} is not registered")]
    ChannelNotRegistered(String),
    #[error("delivery to session {session} failed: {reason}")]
    Delivery { session: String, reason: String },
    #[error("no async runtime is available for the synchronization worker")]
    NoRuntime,
}

/// Errors produced by the registries and the lifecycle coordinator.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// `get` on a type that was never registered.
    #[error("{kind} wasn't found: {unit}")]
    NotFound { kind: UnitKind, unit: String },

    /// A registry was read before it was populated.
    #[error("{kind} {unit} was requested before the {kind} registry was populated")]
    IllegalAccess { kind: UnitKind, unit: String },

    #[error("{failure} - a problem has occurred while loading {kind} {unit}: {message}")]
    Construction {
        kind: UnitKind,
        unit: String,
        failure: ConstructionFailure,
        message: String,
    },

    #[error("{kind} {unit} failed to load: {source}")]
    Load {
        kind: UnitKind,
        unit: String,
        #[source]
        source: UnitError,
    },

    #[error("{kind} {unit} failed during {phase}: {source}")]
    Phase {
        kind: UnitKind,
        unit: String,
        phase: Phase,
        #[source]
        source: UnitError,
    },

    #[error("{kind} {unit} is registered more than once")]
    Duplicate { kind: UnitKind, unit: String },

    #[error("cannot {operation} while the core is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("the core was aborted: {0}")]
    Aborted(String),

    #[error("the core backing this context has been released")]
    ContextReleased,

    #[error("frame encoding error: {0}")]
    Frame(String),

    #[error("host error: {0}")]
    Host(#[from] HostError),
}

impl CoreError {
    /// Whether this error must abort the whole core when it happens during a
    /// forward lifecycle transition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound { .. }
                | CoreError::IllegalAccess { .. }
                | CoreError::Construction { .. }
                | CoreError::Load { .. }
                | CoreError::Duplicate { .. }
                | CoreError::Aborted(_)
        )
    }

    pub(crate) fn not_found<T: ?Sized>(kind: UnitKind) -> Self {
        CoreError::NotFound {
            kind,
            unit: std::any::type_name::<T>().to_string(),
        }
    }
}

/// Terminal condition that shuts the whole core down.
///
/// Never stored by the registries; it only exists long enough to be logged and
/// handed to the host's deactivation hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{cause}")]
pub struct CriticalFault {
    cause: String,
}

impl CriticalFault {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }
}

impl From<&CoreError> for CriticalFault {
    fn from(error: &CoreError) -> Self {
        match error {
            CoreError::Aborted(cause) => CriticalFault::new(cause.clone()),
            other => CriticalFault::new(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CoreError::not_found::<u32>(UnitKind::Module).is_fatal());
        assert!(CoreError::Duplicate {
            kind: UnitKind::Configuration,
            unit: "a".to_string()
        }
        .is_fatal());
        assert!(!CoreError::Phase {
            kind: UnitKind::Module,
            unit: "a".to_string(),
            phase: Phase::Sync,
            source: UnitError::failed("boom"),
        }
        .is_fatal());
        assert!(!CoreError::Frame("too long".to_string()).is_fatal());
    }

    #[test]
    fn test_construction_cause_is_preserved() {
        let error = CoreError::Construction {
            kind: UnitKind::Module,
            unit: "Teleports".to_string(),
            failure: ConstructionFailure::MissingConstructor,
            message: "no context constructor".to_string(),
        };
        let fault = CriticalFault::from(&error);
        assert!(fault.cause().contains("missing expected constructor"));
        assert!(fault.cause().contains("Teleports"));
    }

    #[test]
    fn test_illegal_access_maps_to_construction_kind() {
        let error: ConstructionError = CoreError::IllegalAccess {
            kind: UnitKind::Module,
            unit: "Sibling".to_string(),
        }
        .into();
        assert_eq!(error.failure, ConstructionFailure::IllegalAccess);
    }
}
