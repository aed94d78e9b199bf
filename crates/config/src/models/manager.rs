use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::dispatcher_worker::RunnerConfig;

/// Manager实例的公共设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// 各Manager配置文件所在目录
    pub config_root_path: String,
    /// 服务单元名称模板，`{}` 替换为Manager ID
    pub unit_template: String,
    /// Manager命令套接字所在目录
    pub socket_dir: String,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            config_root_path: "/etc/fleet/managers".to_string(),
            unit_template: "worker-manager@{}.service".to_string(),
            socket_dir: "/tmp/fleet".to_string(),
        }
    }
}

impl ManagerSettings {
    /// Manager配置文件路径: `<config_root_path>/<manager_id>.toml`
    pub fn config_path(&self, manager_id: &str) -> PathBuf {
        Path::new(&self.config_root_path).join(format!("{manager_id}.toml"))
    }

    /// Manager命令套接字路径: `<socket_dir>/<manager_id>.sock`
    pub fn socket_path(&self, manager_id: &str) -> PathBuf {
        Path::new(&self.socket_dir).join(format!("{manager_id}.sock"))
    }

    pub fn unit_name(&self, manager_id: &str) -> String {
        self.unit_template.replace("{}", manager_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.config_root_path.is_empty() {
            return Err(anyhow::anyhow!("Manager配置目录不能为空"));
        }

        if self.socket_dir.is_empty() {
            return Err(anyhow::anyhow!("Manager套接字目录不能为空"));
        }

        if !self.unit_template.contains("{}") {
            return Err(anyhow::anyhow!(
                "服务单元模板必须包含占位符 {{}}: {}",
                self.unit_template
            ));
        }

        Ok(())
    }
}

/// Worker进程启动模板，参数中的 `{id}` 替换为Worker ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProcessTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl WorkerProcessTemplate {
    pub fn render_args(&self, worker_id: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{id}", worker_id))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(anyhow::anyhow!("Worker程序路径不能为空"));
        }
        Ok(())
    }
}

/// 单个Manager实例的配置文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub manager_id: String,
    pub worker: WorkerProcessTemplate,
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl ManagerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", path.display()));
        }

        let config: ManagerConfig = ConfigBuilder::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml))
            .build()
            .context("构建Manager配置失败")?
            .try_deserialize()
            .context("反序列化Manager配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: ManagerConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.manager_id.is_empty() {
            return Err(anyhow::anyhow!("Manager ID不能为空"));
        }
        self.worker.validate()?;
        self.runner.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_settings_paths() {
        let settings = ManagerSettings {
            config_root_path: "/tmp/managers".to_string(),
            ..ManagerSettings::default()
        };
        assert_eq!(
            settings.config_path("manager"),
            PathBuf::from("/tmp/managers/manager.toml")
        );
        assert_eq!(
            settings.unit_name("manager"),
            "worker-manager@manager.service"
        );
        assert_eq!(
            settings.socket_path("manager"),
            PathBuf::from("/tmp/fleet/manager.sock")
        );
    }

    #[test]
    fn test_manager_settings_rejects_empty_socket_dir() {
        let settings = ManagerSettings {
            socket_dir: String::new(),
            ..ManagerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_manager_settings_rejects_template_without_placeholder() {
        let settings = ManagerSettings {
            unit_template: "worker-manager.service".to_string(),
            ..ManagerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_render_args_substitutes_worker_id() {
        let template = WorkerProcessTemplate {
            program: "/usr/bin/worker".to_string(),
            args: vec!["--id".to_string(), "{id}".to_string(), "--log=/var/log/{id}.log".to_string()],
            working_dir: None,
            env: HashMap::new(),
        };
        assert_eq!(
            template.render_args("w1"),
            vec!["--id", "w1", "--log=/var/log/w1.log"]
        );
    }

    #[test]
    fn test_manager_config_from_toml() {
        let config = ManagerConfig::from_toml(
            r#"
            manager_id = "m1"

            [worker]
            program = "/usr/bin/worker"
            args = ["{id}"]

            [runner]
            tick_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.manager_id, "m1");
        assert_eq!(config.worker.args, vec!["{id}"]);
        assert_eq!(config.runner.tick_interval_ms, 50);
    }

    #[test]
    fn test_manager_config_requires_program() {
        let result = ManagerConfig::from_toml(
            r#"
            manager_id = "m1"

            [worker]
            program = ""
            "#,
        );
        assert!(result.is_err());
    }
}
