use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use fleet_core::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{dispatcher_worker::CommandServiceConfig, manager::ManagerSettings};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub manager: ManagerSettings,
    pub command_service: CommandServiceConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/fleet.toml", "fleet.toml", "/etc/fleet/fleet.toml"];

            // 找不到配置文件时全部使用默认值
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEET")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.manager.validate()?;
        self.command_service.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.command_service.reply_timeout_seconds, 30);
    }

    #[test]
    fn test_from_toml_partial_sections_use_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [manager]
            config_root_path = "/srv/managers"
            "#,
        )
        .unwrap();

        assert_eq!(config.manager.config_root_path, "/srv/managers");
        assert_eq!(config.manager.unit_template, "worker-manager@{}.service");
        assert_eq!(config.command_service.sync_poll_interval_ms, 10);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.manager.unit_template, config.manager.unit_template);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = AppConfig::load(Some("/nonexistent/fleet.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[command_service]\nreply_timeout_seconds = 5\nsync_poll_interval_ms = 20"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.command_service.reply_timeout_seconds, 5);
        assert_eq!(config.command_service.sync_poll_interval_ms, 20);
    }
}
