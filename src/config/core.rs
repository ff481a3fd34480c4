use std::path::Path;

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};

use super::settings::Settings;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

const EXTENSIONS: [&str; 4] = ["toml", "json", "yaml", "yml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            other => bail!("Unsupported format: {other}. Use json, toml, or yaml"),
        }
    }

    fn of_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| Self::parse(ext).ok())
            .unwrap_or(ConfigFormat::Toml)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match ConfigFormat::of_path(path) {
        ConfigFormat::Toml => figment.merge(Toml::file(path)),
        ConfigFormat::Json => figment.merge(Json::file(path)),
        ConfigFormat::Yaml => figment.merge(Yaml::file(path)),
    }
}

/// Merged configuration: defaults, user, repository, `--config`, environment
pub struct LessonSyncConfig {
    figment: Figment,
}

impl LessonSyncConfig {
    pub fn load(custom_config: Option<&str>) -> Result<Self> {
        tracing::trace!("CONFIG LOAD: Starting");

        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

        let user_base = Self::user_config_base_path();
        for ext in EXTENSIONS {
            figment = merge_file(figment, Path::new(&format!("{user_base}.{ext}")));
        }
        for ext in EXTENSIONS {
            figment = merge_file(figment, Path::new(&format!("lessonsync.{ext}")));
        }

        if let Some(custom_path) = custom_config {
            let path = Path::new(custom_path);
            if !path.is_file() {
                bail!("Config file not found: {custom_path}");
            }
            tracing::debug!("Using config file {}", path.display());
            figment = merge_file(figment, path);
        }

        // Environment variables always have highest priority
        figment = figment.merge(Env::prefixed("LESSONSYNC_").split("__"));

        Ok(LessonSyncConfig { figment })
    }

    /// Typed view of the merged configuration, validated
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .context("Failed to read configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get a nested object/section as JSON
    pub fn get_section(&self, path: &str) -> Result<serde_json::Value> {
        Ok(self.figment.extract_inner(path)?)
    }

    /// Get the full merged configuration as a structured value
    pub fn get_full_config(&self) -> Result<serde_json::Value> {
        Ok(self.figment.extract()?)
    }

    pub fn export_config(&self, format: ConfigFormat) -> Result<String> {
        let config = self.get_full_config()?;
        let output = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
            ConfigFormat::Toml => toml::to_string_pretty(&config)?,
            ConfigFormat::Yaml => serde_yml::to_string(&config)?,
        };
        Ok(output)
    }

    fn user_config_base_path() -> String {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/.config/lessonsync/config"),
            Err(_) => "~/.config/lessonsync/config".to_string(),
        }
    }
}
