//! Optional handles to external systems running in the same host.
//!
//! A missing dependency is normal: it only means the external system is not
//! installed or not active. Handles are never refreshed after attachment, so a
//! caller must tolerate a handle whose system has since gone away.

use crate::catalog::DependencySpec;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The probe surface the host supplies for dependency discovery.
pub trait DependencyProbe: Send + Sync {
    /// Whether the named external system is currently active.
    fn is_system_active(&self, system: &str) -> bool;

    /// Loads the capability handle the named system exposes.
    fn load_capability(&self, system: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Holds capability handles keyed by capability type.
#[derive(Default)]
pub struct DependencyBroker {
    handles: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DependencyBroker {
    /// Probes each declared system and stores the handle of every active one.
    pub fn attach_all<P>(specs: &[DependencySpec], probe: &P) -> Self
    where
        P: DependencyProbe + ?Sized,
    {
        let mut broker = Self::default();

        for spec in specs {
            if !probe.is_system_active(spec.system()) {
                debug!("Dependency {} is not active", spec.system());
                continue;
            }

            match probe.load_capability(spec.system()) {
                Some(handle) if (*handle).type_id() == spec.capability() => {
                    info!("Attached dependency {}", spec.system());
                    broker.handles.insert(spec.capability(), handle);
                }
                Some(_) => {
                    warn!(
                        "Dependency {} is active but does not provide {}",
                        spec.system(),
                        spec.capability_name()
                    );
                }
                None => {
                    warn!("Dependency {} is active but exposed no capability", spec.system());
                }
            }
        }

        broker
    }

    /// Returns the handle for capability `T`, or `None` if its system was not
    /// active at attach time.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.handles
            .get(&TypeId::of::<T>())
            .and_then(|handle| handle.clone().downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SecurityApi {
        level: u8,
    }

    struct ChatBridge;

    struct FixedProbe {
        active: Vec<&'static str>,
    }

    impl DependencyProbe for FixedProbe {
        fn is_system_active(&self, system: &str) -> bool {
            self.active.contains(&system)
        }

        fn load_capability(&self, system: &str) -> Option<Arc<dyn Any + Send + Sync>> {
            match system {
                "SecurityMaster" => Some(Arc::new(SecurityApi { level: 3 })),
                "Minecord" => Some(Arc::new(42u32)),
                _ => None,
            }
        }
    }

    fn specs() -> Vec<DependencySpec> {
        vec![
            DependencySpec::new::<SecurityApi>("SecurityMaster"),
            DependencySpec::new::<ChatBridge>("Minecord"),
        ]
    }

    #[test]
    fn test_active_dependency_is_attached() {
        let probe = FixedProbe {
            active: vec!["SecurityMaster"],
        };
        let broker = DependencyBroker::attach_all(&specs(), &probe);

        let api = broker.get::<SecurityApi>().expect("security api attached");
        assert_eq!(api.level, 3);
        assert_eq!(broker.len(), 1);
    }

    #[test]
    fn test_inactive_dependency_is_absent() {
        let probe = FixedProbe { active: vec![] };
        let broker = DependencyBroker::attach_all(&specs(), &probe);

        assert!(broker.get::<SecurityApi>().is_none());
        assert!(broker.is_empty());
    }

    #[test]
    fn test_mismatched_capability_is_absent() {
        let probe = FixedProbe {
            active: vec!["Minecord"],
        };
        let broker = DependencyBroker::attach_all(&specs(), &probe);

        assert!(broker.get::<ChatBridge>().is_none());
        assert!(broker.get::<u32>().is_none());
    }
}
