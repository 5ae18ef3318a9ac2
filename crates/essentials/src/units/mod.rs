//! Units bundled with the essentials host.

pub mod common;
pub mod heartbeat;
pub mod messages;
pub mod motd;

use essentials_core::{LifecycleCoordinator, UnitCatalog, UnitError, UnitType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Discovery scope covering every unit in this module tree.
pub const UNIT_SCOPE: &str = "essentials::units";

/// Registration table of the bundled units.
pub fn catalog() -> UnitCatalog {
    let mut catalog = UnitCatalog::new().with_scope(UNIT_SCOPE);
    catalog
        .register_configuration::<common::CommonConfiguration>()
        .register_configuration::<messages::MessagesConfiguration>()
        .register_module::<heartbeat::Heartbeat>()
        .register_module::<motd::Motd>()
        .gate_modules_with::<common::CommonConfiguration>();
    catalog
}

/// Waits for heartbeats still being delivered, if the heartbeat module runs.
pub async fn flush_heartbeats(core: &LifecycleCoordinator) {
    let enabled = core
        .modules()
        .map(|modules| modules.contains(UnitType::of::<heartbeat::Heartbeat>()))
        .unwrap_or(false);
    if !enabled {
        return;
    }

    if let Ok(heartbeat) = core.module::<heartbeat::Heartbeat>() {
        heartbeat.flush().await;
    }
}

/// Reads a TOML file, writing `T::default()` to it first if it is missing.
pub(crate) fn load_or_create<T>(path: &Path) -> Result<T, UnitError>
where
    T: DeserializeOwned + Serialize + Default,
{
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        return toml::from_str(&content)
            .map_err(|e| UnitError::invalid_data(format!("{}: {}", path.display(), e)));
    }

    let defaults = T::default();
    let content = toml::to_string_pretty(&defaults).map_err(|e| UnitError::invalid_data(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    info!("Created default configuration file: {}", path.display());
    Ok(defaults)
}
