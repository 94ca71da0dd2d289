use std::path::PathBuf;

use directories::BaseDirs;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::chat::ChatSettings;
use crate::filter::FilterSettings;
use crate::providers::LlmSettings;

const CONFIG: &str = include_str!("../.config/config.json5");

/// Workbook location
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub workbook_path: PathBuf,
    pub backup_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            workbook_path: PathBuf::from("SCHEDULING.xlsx"),
            backup_dir: PathBuf::from("backups"),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub llm: LlmSettings,
}

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
}

impl Config {
    /// Layers, lowest first: embedded defaults, the user file, `RESPLAN__*` variables.
    ///
    /// An explicit `config_path` must exist; the home file (`~/.resplan-config.json5`) is optional.
    pub fn from_path(config_path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5));

        builder = match config_path {
            Some(p) => builder.add_source(
                config::File::from(expand_tilde(p)).format(config::FileFormat::Json5).required(true),
            ),
            None => builder.add_source(
                config::File::from(default_home_config_path())
                    .format(config::FileFormat::Json5)
                    .required(false),
            ),
        };

        builder = builder.add_source(
            config::Environment::with_prefix(&PROJECT_NAME)
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.data.workbook_path = expand_tilde(&cfg.data.workbook_path);
        cfg.data.backup_dir = expand_tilde(&cfg.data.backup_dir);
        cfg.llm = cfg.llm.with_env_keys();
        Ok(cfg)
    }

    /// The embedded defaults alone
    pub fn defaults() -> Result<Self, json5::Error> {
        json5::from_str(CONFIG)
    }
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Some(s) = path.to_str() {
        if s.starts_with("~") {
            if let Some(base) = BaseDirs::new() { return PathBuf::from(s.replacen("~", base.home_dir().to_str().unwrap_or(""), 1)); }
        }
    }
    path.clone()
}

fn default_home_config_path() -> PathBuf {
    if let Some(base) = BaseDirs::new() {
        return base.home_dir().join(".resplan-config.json5");
    }
    PathBuf::from(".resplan-config.json5")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_embedded_defaults_match_code_defaults() {
        let cfg = Config::defaults().unwrap();
        assert_eq!(cfg.data, DataConfig::default());
        assert_eq!(cfg.filter, FilterSettings::default());
        assert_eq!(cfg.chat, ChatSettings::default());
        assert_eq!(cfg.llm.provider, None);
        assert_eq!(cfg.llm.ollama.model, "llama3.2");
    }

    #[test]
    fn test_user_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resplan.json5");
        std::fs::write(
            &path,
            r#"{
                // only what differs
                chat: { suggestion_limit: 5 },
                llm: { provider: "Ollama" },
                data: { workbook_path: "plans/2025.xlsx" },
            }"#,
        )
        .unwrap();

        let cfg = Config::from_path(Some(&path)).unwrap();
        assert_eq!(cfg.chat.suggestion_limit, 5);
        assert_eq!(cfg.chat.timeout_secs, 30);
        assert_eq!(cfg.llm.provider, Some(crate::providers::LlmProvider::Ollama));
        assert_eq!(cfg.data.workbook_path, PathBuf::from("plans/2025.xlsx"));
        assert_eq!(cfg.data.backup_dir, PathBuf::from("backups"));
        assert_eq!(cfg.filter.categorical_threshold, 10);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::from_path(Some(&dir.path().join("nope.json5"))).is_err());
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        let p = PathBuf::from("data/SCHEDULING.xlsx");
        assert_eq!(expand_tilde(&p), p);
    }
}
