//! # Essentials Core
//!
//! An in-process registry and lifecycle engine for server integrations. The
//! host registers a set of unit types, the core builds exactly one instance of
//! each, hands every instance a [`HostContext`], and drives all of them through
//! a fixed sequence of lifecycle phases.
//!
//! ## Unit kinds
//!
//! - **Configuration units** ([`ConfigurationUnit`]) own one configuration
//!   domain and its backing file. They are loaded before anything else.
//! - **Feature units** ([`FeatureUnit`]), called modules, implement one
//!   pluggable feature each. A module whose enable flag is off is never built.
//! - **Dependencies** are optional handles to other systems running in the
//!   same host. A missing dependency is normal.
//!
//! ## Lifecycle
//!
//! [`LifecycleCoordinator::enable`] loads configurations, builds modules,
//! attaches dependencies and late-initializes modules. Any failure on the way
//! aborts the whole core and asks the host to deactivate the integration.
//! Once running, [`reload`](LifecycleCoordinator::reload) and
//! [`sync`](LifecycleCoordinator::sync) may be called any number of times, and
//! [`disable`](LifecycleCoordinator::disable) shuts every module down.
//!
//! ## Example
//!
//! ```ignore
//! use essentials_core::*;
//!
//! let mut catalog = UnitCatalog::new();
//! catalog
//!     .register_configuration::<CommonConfiguration>()
//!     .register_module::<Heartbeat>()
//!     .gate_modules_with::<CommonConfiguration>();
//!
//! let core = LifecycleCoordinator::new(catalog, host, CoreOptions::default());
//! core.enable()?;
//! core.sync()?;
//! core.disable()?;
//! ```

pub mod catalog;
pub mod configuration;
pub mod context;
pub mod dependency;
pub mod error;
pub mod lifecycle;
pub mod messaging;
pub mod module;
pub mod scheduler;
pub mod unit;

pub use catalog::{Capability, DependencySpec, Registration, UnitCatalog};
pub use configuration::ConfigurationRegistry;
pub use context::{HostContext, HostPlatform, LogLevel, Session};
pub use dependency::{DependencyBroker, DependencyProbe};
pub use error::{
    ConstructionError, ConstructionFailure, CoreError, CriticalFault, HostError, UnitError, UnitKind,
};
pub use lifecycle::{CoreOptions, LifecycleCoordinator, LifecycleState};
pub use messaging::{decode_proxy_frame, encode_proxy_frame, ProxyCall, DEFAULT_PROXY_CHANNEL};
pub use module::{ModuleRegistry, PhaseReport};
pub use scheduler::SyncExecutor;
pub use unit::{ConfigurationUnit, FeatureUnit, ModuleGate, Phase, Unit, UnitType};

// Re-exported so hosts can implement `HostPlatform` without a direct dependency.
pub use async_trait::async_trait;
