//! 子命令实现
//!
//! 每个命令接收已合并命令行参数的配置，返回结构化结果，由 main 负责输出。

use catalog_core::database::{self, schema};
use catalog_core::{
    CatalogError, CatalogStats, DepartmentDao, DepartmentRefactor, MigrationError,
    MigrationReport, Page, Product, ProductDao, ProductQuery, SchemaVersion, StepFailure,
    TableInfo, VerificationReport,
};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("数据库文件不存在: {0}")]
    DatabaseNotFound(PathBuf),
    #[error("数据库尚未迁移，当前结构: {0:?}")]
    NotMigrated(SchemaVersion),
    #[error(transparent)]
    Step(#[from] StepFailure),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),
}

/// 当前结构概览
#[derive(Debug, Clone, Serialize)]
pub struct SchemaOverview {
    pub version: SchemaVersion,
    pub tables: Vec<TableInfo>,
}

fn open_existing(path: &Path) -> Result<Connection, CommandError> {
    // open_connection 会创建不存在的文件，这里要先拦住
    if !path.is_file() {
        return Err(CommandError::DatabaseNotFound(path.to_path_buf()));
    }
    Ok(database::open_connection(path)?)
}

fn ensure_migrated(conn: &Connection) -> Result<(), CommandError> {
    match schema::detect_schema_version(conn)? {
        SchemaVersion::V2 => Ok(()),
        other => Err(CommandError::NotMigrated(other)),
    }
}

/// 执行完整迁移
pub fn migrate(config: &AppConfig) -> Result<MigrationReport, CommandError> {
    let conn = open_existing(&config.database.path)?;
    let mut refactor = DepartmentRefactor::new(conn, config.refactor_options());
    Ok(refactor.run_migration()?)
}

/// 只执行备份步骤
pub fn backup(config: &AppConfig) -> Result<PathBuf, CommandError> {
    let conn = open_existing(&config.database.path)?;
    let mut refactor = DepartmentRefactor::new(conn, config.refactor_options());
    Ok(refactor.create_backup()?)
}

pub fn schema(config: &AppConfig) -> Result<SchemaOverview, CommandError> {
    let conn = open_existing(&config.database.path)?;
    Ok(SchemaOverview {
        version: schema::detect_schema_version(&conn)?,
        tables: schema::describe_schema(&conn)?,
    })
}

/// 对已迁移的库单独执行验证
///
/// 没有迁移前的基线，只能检查外键关联和抽样字段。
pub fn verify(config: &AppConfig) -> Result<VerificationReport, CommandError> {
    let conn = open_existing(&config.database.path)?;
    let mut refactor = DepartmentRefactor::new(conn, config.refactor_options());
    Ok(refactor.verify_refactoring()?)
}

pub fn stats(config: &AppConfig) -> Result<CatalogStats, CommandError> {
    let conn = open_existing(&config.database.path)?;
    ensure_migrated(&conn)?;
    Ok(DepartmentDao::stats(&conn)?)
}

/// 分页列出商品，给出部门 ID 时只列该部门的商品
pub fn products(
    config: &AppConfig,
    department_id: Option<i64>,
    query: &ProductQuery,
) -> Result<Page<Product>, CommandError> {
    let conn = open_existing(&config.database.path)?;
    ensure_migrated(&conn)?;
    let page = match department_id {
        Some(id) => ProductDao::list_by_department(&conn, id, query)?,
        None => ProductDao::list(&conn, query)?,
    };
    Ok(page)
}

pub fn search(config: &AppConfig, q: &str) -> Result<Vec<Product>, CommandError> {
    let conn = open_existing(&config.database.path)?;
    ensure_migrated(&conn)?;
    Ok(ProductDao::search(&conn, q)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("missing.db");

        assert!(matches!(schema(&config), Err(CommandError::DatabaseNotFound(_))));
        assert!(!config.database.path.exists());
    }

    #[test]
    fn test_stats_requires_migrated_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("catalog.db");
        let conn = database::open_connection(&config.database.path).unwrap();
        schema::create_v1_schema(&conn).unwrap();
        drop(conn);

        assert!(matches!(
            stats(&config),
            Err(CommandError::NotMigrated(SchemaVersion::V1))
        ));
    }
}
