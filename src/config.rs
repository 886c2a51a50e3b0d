//! 配置管理
//!
//! YAML 配置文件，默认位于 `<config_dir>/catalog-migrate/config.yaml`。
//! 文件不存在时使用默认值，命令行参数覆盖文件中的值。

use catalog_core::database::migration::DEFAULT_SAMPLE_SIZE;
use catalog_core::RefactorOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("读写配置文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置文件格式错误: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub backup: BackupConfig,
    pub verification: VerificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite 数据库文件
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("catalog.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// 备份文件目录
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("backups"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// 验证时抽样检查的商品数
    pub sample_size: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，RUST_LOG 优先
    pub level: String,
    /// 额外写入的日志文件
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl AppConfig {
    /// 用命令行参数覆盖配置值
    pub fn with_overrides(mut self, database: Option<PathBuf>, backup_dir: Option<PathBuf>) -> Self {
        if let Some(path) = database {
            self.database.path = path;
        }
        if let Some(dir) = backup_dir {
            self.backup.dir = dir;
        }
        self
    }

    pub fn refactor_options(&self) -> RefactorOptions {
        RefactorOptions {
            backup_dir: self.backup.dir.clone(),
            sample_size: self.verification.sample_size,
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("catalog-migrate")
        .join("config.yaml")
}

/// 加载配置，`path` 为空时使用默认位置
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        let config = serde_yaml::from_str(&content)?;
        tracing::debug!("[配置] 已加载配置文件: {}", path.display());
        Ok(config)
    } else {
        tracing::debug!("[配置] 配置文件不存在，使用默认配置: {}", path.display());
        Ok(AppConfig::default())
    }
}

pub fn save_config(config: &AppConfig, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_yaml::to_string(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}
