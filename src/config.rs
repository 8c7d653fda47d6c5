use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::boq::controller::{ControllerSettings, MissingItemSource};
use crate::boq::rows::ImportSettings;

/// Main configuration structure for the BOQ lifecycle tool
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BoqLifecycleConfig {
    /// Row import settings
    pub import: ImportConfig,
    /// Missing item and task derivation settings
    pub derivation: DerivationConfig,
    /// Record storage
    pub storage: StorageConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows between two progress notifications
    pub progress_interval: usize,
    /// Deepest WBS level kept; deeper rows are capped to it
    pub max_wbs_level: u32,
    /// Item names longer than this are truncated
    pub item_name_max_len: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// Which line collections are scanned for missing items
    pub missing_item_source: MissingItemSource,
    /// Stock UOM for created items whose lines carry none
    pub default_stock_uom: String,
    /// Naming-series prefix per item group
    pub group_codes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON document per BOQ record
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        let defaults = ImportSettings::default();
        Self {
            progress_interval: defaults.progress_interval,
            max_wbs_level: defaults.max_wbs_level,
            item_name_max_len: defaults.item_name_max_len,
        }
    }
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            missing_item_source: MissingItemSource::Both,
            default_stock_uom: "Nos".to_string(),
            group_codes: HashMap::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".boq-lifecycle/records"),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl BoqLifecycleConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (boq-lifecycle.toml, .boq-lifecycle-rc)
    /// 3. Environment variables (prefixed with BOQ_LIFECYCLE_)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`load`](Self::load) with configuration files looked up in `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join("boq-lifecycle.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".boq-lifecycle-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        // Override with environment variables, e.g. BOQ_LIFECYCLE_STORAGE__DATA_DIR
        builder = builder.add_source(
            Environment::with_prefix("BOQ_LIFECYCLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            progress_interval: self.import.progress_interval,
            max_wbs_level: self.import.max_wbs_level,
            item_name_max_len: self.import.item_name_max_len,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            import: self.import_settings(),
            missing_item_source: self.derivation.missing_item_source,
        }
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<BoqLifecycleConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = BoqLifecycleConfig::load_env_file();
        BoqLifecycleConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static BoqLifecycleConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
