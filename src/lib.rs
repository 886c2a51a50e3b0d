//! catalog-migrate - 商品目录部门规范化工具
//!
//! 命令行前端：配置加载、日志初始化、子命令实现。
//! 迁移逻辑本身在 catalog-core crate 中。

pub mod commands;
pub mod config;
pub mod logger;

pub use catalog_core::{
    AbortHandle, CatalogError, CatalogStats, DepartmentRefactor, MigrationError, MigrationReport,
    MigrationState, MigrationStep, RefactorOptions, SchemaVersion, StepFailure, TableInfo,
    VerificationReport,
};
pub use commands::CommandError;
pub use config::{AppConfig, ConfigError};
