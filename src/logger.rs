//! 日志初始化

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("无法打开日志文件: {0}")]
    Io(#[from] std::io::Error),
    #[error("日志系统初始化失败: {0}")]
    Init(String),
}

/// 命令行开关优先于配置中的级别
pub fn resolve_level<'a>(config: &'a LoggingConfig, verbose: bool, quiet: bool) -> &'a str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        &config.level
    }
}

/// 安装全局 tracing subscriber
///
/// 设置了 RUST_LOG 时以其为准。配置了日志文件时输出到文件，否则输出到 stderr。
pub fn init_logging(config: &LoggingConfig, verbose: bool, quiet: bool) -> Result<(), LoggerError> {
    let level = resolve_level(config, verbose, quiet);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.map_err(|e| LoggerError::Init(e.to_string()))
}
