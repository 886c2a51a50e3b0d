//! 部门规范化迁移
//!
//! 把 products 表上的 department 文本列迁移到独立的 departments 表，
//! products 改为通过 department_id 外键引用部门。
//!
//! 迁移步骤：
//! 1. 备份整个数据库（失败则立即停止，不做任何变更）
//! 2. 创建 departments 表（幂等）
//! 3. 提取商品中出现的部门名（为空视为致命错误）
//! 4. 写入 departments 表（幂等）
//! 5. 在单个事务中重建 products 表
//! 6. 验证迁移结果
//!
//! 没有自动回滚，备份只用于人工恢复。

mod backup;
mod departments;
mod products;
mod state;
mod verify;

pub use state::{AbortHandle, MigrationState, MigrationStep};
pub use verify::VerificationReport;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::database::schema::{self, TableInfo};
use crate::errors::{MigrationError, StepFailure};

/// 默认抽样检查的商品数
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// 迁移选项
#[derive(Debug, Clone)]
pub struct RefactorOptions {
    /// 备份文件所在目录
    pub backup_dir: PathBuf,
    /// 验证时抽样检查的商品数
    pub sample_size: usize,
}

impl Default for RefactorOptions {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("."),
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

/// 迁移前记录的基线，用于迁移后比对
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Baseline {
    /// 备份时 products 表的行数
    pub product_count: Option<i64>,
    /// 提取到的部门名
    pub department_names: Option<Vec<String>>,
    /// 每个部门的商品数
    pub per_department: BTreeMap<String, i64>,
}

/// 完整迁移的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub backup_path: PathBuf,
    pub departments: Vec<String>,
    pub inserted_departments: usize,
    pub migrated_products: usize,
    pub verification: VerificationReport,
}

/// 部门规范化迁移器
///
/// 迁移期间独占数据库连接，结束后通过 `into_connection` 交还。
pub struct DepartmentRefactor {
    conn: Connection,
    options: RefactorOptions,
    state: MigrationState,
    abort: AbortHandle,
    baseline: Baseline,
    backup_path: Option<PathBuf>,
    /// 在商品表重建事务提交前触发中止
    #[cfg(test)]
    abort_before_commit: bool,
}

impl DepartmentRefactor {
    pub fn new(conn: Connection, options: RefactorOptions) -> Self {
        Self {
            conn,
            options,
            state: MigrationState::NotStarted,
            abort: AbortHandle::new(),
            baseline: Baseline::default(),
            backup_path: None,
            #[cfg(test)]
            abort_before_commit: false,
        }
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// 获取中止句柄，可在其他线程上调用 `abort()`
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// 读取并记录当前表结构
    pub fn show_current_schema(&self) -> Result<Vec<TableInfo>, MigrationError> {
        let tables = schema::describe_schema(&self.conn)?;
        for table in &tables {
            tracing::info!("[部门迁移] 当前结构\n{}", table.render().trim_end());
        }
        Ok(tables)
    }

    /// 按顺序执行全部迁移步骤
    pub fn run_migration(&mut self) -> Result<MigrationReport, StepFailure> {
        tracing::info!("[部门迁移] 开始执行部门规范化迁移");

        let backup_path = self
            .create_backup()
            .map_err(|e| StepFailure::new(MigrationStep::CreateBackup, e))?;

        if let Err(e) = self.show_current_schema() {
            tracing::warn!("[部门迁移] 读取当前结构失败: {}", e);
        }

        self.create_departments_table()
            .map_err(|e| StepFailure::new(MigrationStep::CreateDepartmentsTable, e))?;

        let departments = self
            .extract_unique_departments()
            .map_err(|e| StepFailure::new(MigrationStep::ExtractUniqueDepartments, e))?;
        if departments.is_empty() {
            let err = MigrationError::PrerequisiteMissing(
                "products 表中没有找到任何部门，无法继续迁移".to_string(),
            );
            self.fail(MigrationStep::ExtractUniqueDepartments, &err);
            return Err(StepFailure::new(MigrationStep::ExtractUniqueDepartments, err));
        }

        let inserted_departments = self
            .populate_departments_table(&departments)
            .map_err(|e| StepFailure::new(MigrationStep::PopulateDepartmentsTable, e))?;

        let migrated_products = self
            .update_products_table()
            .map_err(|e| StepFailure::new(MigrationStep::UpdateProductsTable, e))?;

        let verification = self
            .verify_refactoring()
            .map_err(|e| StepFailure::new(MigrationStep::VerifyRefactoring, e))?;
        if !verification.passed() {
            tracing::error!(
                "[部门迁移] 迁移已生效但验证不一致，请决定是否从备份恢复: {}",
                backup_path.display()
            );
            return Err(StepFailure::new(
                MigrationStep::VerifyRefactoring,
                MigrationError::VerificationMismatch(verification.mismatches.clone()),
            ));
        }

        tracing::info!(
            "[部门迁移] 迁移完成: 部门 {} 个，商品 {} 条，备份 {}",
            departments.len(),
            migrated_products,
            backup_path.display()
        );

        Ok(MigrationReport {
            backup_path,
            departments,
            inserted_departments,
            migrated_products,
            verification,
        })
    }

    /// 执行单个步骤并推进状态
    fn track<T>(
        &mut self,
        step: MigrationStep,
        f: impl FnOnce(&mut Self) -> Result<T, MigrationError>,
    ) -> Result<T, MigrationError> {
        let result = self.check_abort(step).and_then(|_| f(self));
        match &result {
            Ok(_) => {
                if let Some(next) = MigrationState::completed(step) {
                    self.state = next;
                }
            }
            Err(err) => self.fail(step, err),
        }
        result
    }

    fn fail(&mut self, step: MigrationStep, err: &MigrationError) {
        tracing::error!("[部门迁移] 步骤 {} 失败: {}", step, err);
        self.state = MigrationState::Aborted {
            step,
            reason: err.to_string(),
        };
    }

    fn check_abort(&self, step: MigrationStep) -> Result<(), MigrationError> {
        if self.abort.is_aborted() {
            return Err(MigrationError::Aborted(format!("步骤 {step} 开始前收到中止信号")));
        }
        Ok(())
    }
}

/// 把重建商品表时的约束错误归类为 ConstraintViolation，其余保持数据库错误
fn classify_sql_error(err: rusqlite::Error, context: &str) -> MigrationError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            MigrationError::ConstraintViolation(format!(
                "{context}: {}",
                msg.clone().unwrap_or_else(|| e.to_string())
            ))
        }
        _ => MigrationError::Database(err),
    }
}

fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::database::dao::ProductDao;
    use crate::models::NewProduct;

    pub fn product(id: i64, department: &str) -> NewProduct {
        NewProduct {
            id,
            cost: 10.0 + id as f64,
            category: if id % 2 == 0 { "Jeans" } else { "Tops" }.to_string(),
            name: Some(format!("Product {id}")),
            brand: if id % 3 == 0 { None } else { Some("Levi's".to_string()) },
            retail_price: 20.0 + id as f64,
            department: department.to_string(),
            sku: format!("{id:0>32}"),
            distribution_center_id: id % 10 + 1,
        }
    }

    /// 内存中的 V1 库，`men` 个 Men 商品和 `women` 个 Women 商品
    pub fn v1_store(men: i64, women: i64) -> Connection {
        let conn = crate::database::open_in_memory().unwrap();
        schema::create_v1_schema(&conn).unwrap();
        for id in 1..=men {
            ProductDao::insert_legacy(&conn, &product(id, "Men")).unwrap();
        }
        for id in men + 1..=men + women {
            ProductDao::insert_legacy(&conn, &product(id, "Women")).unwrap();
        }
        conn
    }

    /// 没有 CHECK 约束的 V1 表（批量导入工具覆盖表结构后常见的情况）
    pub fn loose_v1_store(rows: &[(i64, &str)]) -> Connection {
        let conn = crate::database::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE products (
                id INTEGER PRIMARY KEY, cost REAL, category TEXT, name TEXT, brand TEXT,
                retail_price REAL, department TEXT, sku TEXT, distribution_center_id INTEGER
            )",
        )
        .unwrap();
        for (id, department) in rows {
            ProductDao::insert_legacy(&conn, &product(*id, department)).unwrap();
        }
        conn
    }

    pub fn refactor_in(conn: Connection, dir: &tempfile::TempDir) -> DepartmentRefactor {
        DepartmentRefactor::new(
            conn,
            RefactorOptions {
                backup_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
        )
    }
}
