//! 步骤 1：备份
//!
//! 使用 SQLite 在线备份 API 把整个库复制到带时间戳的文件，
//! 然后校验备份文件可以打开、结构完整，且商品行数与源库一致。

use chrono::Local;
use rusqlite::backup::Backup;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{count_rows, DepartmentRefactor, MigrationStep};
use crate::database::schema::{self, PRODUCTS_TABLE};
use crate::errors::MigrationError;

/// 备份文件名前缀
pub const BACKUP_FILE_PREFIX: &str = "catalog_backup";

impl DepartmentRefactor {
    /// 备份整个数据库
    ///
    /// 失败时返回 `BackupFailure`，迁移必须立即停止。
    pub fn create_backup(&mut self) -> Result<PathBuf, MigrationError> {
        self.track(MigrationStep::CreateBackup, |this| {
            tracing::info!("[部门迁移] 正在创建数据库备份...");

            std::fs::create_dir_all(&this.options.backup_dir).map_err(|e| {
                MigrationError::BackupFailure(format!(
                    "创建备份目录失败 {}: {}",
                    this.options.backup_dir.display(),
                    e
                ))
            })?;
            let path = next_backup_path(&this.options.backup_dir);

            let source_count = product_count(&this.conn)
                .map_err(|e| MigrationError::BackupFailure(format!("读取源库商品数失败: {e}")))?;
            let backup_count = backup_to_file(&this.conn, &path)?;

            if backup_count != source_count {
                return Err(MigrationError::BackupFailure(format!(
                    "备份商品数不一致: 源库 {} 条，备份 {} 条",
                    source_count, backup_count
                )));
            }

            this.baseline.product_count = Some(source_count);
            this.backup_path = Some(path.clone());
            tracing::info!(
                "[部门迁移] 备份已创建: {} (商品 {} 条)",
                path.display(),
                source_count
            );
            Ok(path)
        })
    }
}

/// 生成不与已有文件冲突的备份路径
fn next_backup_path(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = dir.join(format!("{BACKUP_FILE_PREFIX}_{stamp}.db"));
    if !base.exists() {
        return base;
    }
    (1..)
        .map(|n| dir.join(format!("{BACKUP_FILE_PREFIX}_{stamp}_{n}.db")))
        .find(|p| !p.exists())
        .unwrap_or(base)
}

fn product_count(conn: &Connection) -> rusqlite::Result<i64> {
    if schema::table_exists(conn, PRODUCTS_TABLE)? {
        count_rows(conn, PRODUCTS_TABLE)
    } else {
        Ok(0)
    }
}

/// 复制到目标文件并校验，返回备份中的商品行数
fn backup_to_file(src: &Connection, dst: &Path) -> Result<i64, MigrationError> {
    let mut dst_conn = Connection::open(dst).map_err(|e| {
        MigrationError::BackupFailure(format!("创建备份数据库失败 {}: {}", dst.display(), e))
    })?;

    {
        let backup = Backup::new(src, &mut dst_conn).map_err(|e| {
            MigrationError::BackupFailure(format!("初始化 SQLite backup 失败: {e}"))
        })?;
        backup
            .run_to_completion(100, Duration::from_millis(10), None)
            .map_err(|e| MigrationError::BackupFailure(format!("执行 SQLite backup 失败: {e}")))?;
    }

    let integrity: String = dst_conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| {
            MigrationError::BackupFailure(format!("备份完整性检查失败 {}: {}", dst.display(), e))
        })?;
    if integrity != "ok" {
        return Err(MigrationError::BackupFailure(format!(
            "备份完整性校验不通过 {}: {}",
            dst.display(),
            integrity
        )));
    }

    product_count(&dst_conn)
        .map_err(|e| MigrationError::BackupFailure(format!("读取备份商品数失败: {e}")))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::MigrationState;
    use super::*;

    #[test]
    fn test_backup_is_restorable_with_same_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(2, 3), &dir);

        let path = refactor.create_backup().unwrap();

        assert!(path.starts_with(dir.path()));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("catalog_backup_"));
        assert_eq!(refactor.state(), &MigrationState::BackedUp);
        assert_eq!(refactor.baseline().product_count, Some(5));

        let restored = Connection::open(&path).unwrap();
        assert_eq!(count_rows(&restored, "products").unwrap(), 5);
        assert_eq!(
            schema::detect_schema_version(&restored).unwrap(),
            schema::SchemaVersion::V1
        );
    }

    #[test]
    fn test_consecutive_backups_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(1, 1), &dir);

        let first = refactor.create_backup().unwrap();
        let second = refactor.create_backup().unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }
}
