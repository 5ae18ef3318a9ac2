//! Settings shared by every module: the server role and the module switches.

use essentials_core::{ConfigurationUnit, ConstructionError, HostContext, ModuleGate, Unit, UnitError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

const FILE_NAME: &str = "common.toml";

/// The role this server plays in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Lobby,
    Auth,
    Survival,
    Creative,
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Lobby => write!(f, "lobby"),
            ServerType::Auth => write!(f, "auth"),
            ServerType::Survival => write!(f, "survival"),
            ServerType::Creative => write!(f, "creative"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonSettings {
    pub server_type: ServerType,
    /// Module name to enable flag. Modules missing here are enabled.
    #[serde(default)]
    pub modules: BTreeMap<String, bool>,
}

impl Default for CommonSettings {
    fn default() -> Self {
        let modules = [super::heartbeat::Heartbeat::NAME, super::motd::Motd::NAME]
            .into_iter()
            .map(|name| (name.to_string(), true))
            .collect();

        Self {
            server_type: ServerType::Lobby,
            modules,
        }
    }
}

pub struct CommonConfiguration {
    path: PathBuf,
    settings: RwLock<CommonSettings>,
}

impl CommonConfiguration {
    pub fn server_type(&self) -> ServerType {
        self.settings.read().server_type
    }
}

impl Unit for CommonConfiguration {
    const NAME: &'static str = "CommonConfiguration";

    fn construct(context: HostContext) -> Result<Self, ConstructionError> {
        Ok(Self {
            path: context.data_directory()?.join(FILE_NAME),
            settings: RwLock::new(CommonSettings::default()),
        })
    }
}

impl ConfigurationUnit for CommonConfiguration {
    fn load_file(&self) -> Result<(), UnitError> {
        let settings: CommonSettings = super::load_or_create(&self.path)?;
        info!(
            "Server type: {} ({} module switches)",
            settings.server_type,
            settings.modules.len()
        );
        *self.settings.write() = settings;
        Ok(())
    }
}

impl ModuleGate for CommonConfiguration {
    fn module_state(&self, module: &str) -> bool {
        match self.settings.read().modules.get(module) {
            Some(&enabled) => enabled,
            None => {
                debug!("No switch for module {}, enabling it", module);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_enable_bundled_modules() {
        let settings = CommonSettings::default();
        assert_eq!(settings.server_type, ServerType::Lobby);
        assert_eq!(settings.modules.get("Heartbeat"), Some(&true));
        assert_eq!(settings.modules.get("Motd"), Some(&true));
    }

    #[test]
    fn test_settings_parse() {
        let settings: CommonSettings = toml::from_str(
            r#"
server_type = "survival"

[modules]
Heartbeat = false
"#,
        )
        .unwrap();

        assert_eq!(settings.server_type, ServerType::Survival);
        assert_eq!(settings.modules.get("Heartbeat"), Some(&false));
        assert!(settings.modules.get("Motd").is_none());
    }

    #[test]
    fn test_unknown_server_type_is_rejected() {
        assert!(toml::from_str::<CommonSettings>("server_type = \"minigames\"").is_err());
    }
}
