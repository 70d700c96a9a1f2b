use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use vboxmanage_client::RunnerConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneralConfig {
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> GeneralConfig {
        GeneralConfig {
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VBoxManageConfig {
    pub path: String,
    /// 0 waits forever
    pub timeout_secs: u64,
}

impl Default for VBoxManageConfig {
    fn default() -> VBoxManageConfig {
        VBoxManageConfig {
            path: RunnerConfig::from_env().vboxmanage.display().to_string(),
            timeout_secs: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub vboxmanage: VBoxManageConfig,
}

impl AppConfig {
    /// defaults, then the optional toml file, then `VBOXCTL_` environment variables
    pub fn load(config_path: Option<&str>) -> Result<AppConfig, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("VBOXCTL_").split("__"))
            .extract::<AppConfig>()
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let timeout = match self.vboxmanage.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        RunnerConfig {
            vboxmanage: PathBuf::from(&self.vboxmanage.path),
            timeout,
        }
    }
}
