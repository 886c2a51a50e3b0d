//! 步骤 2-4：部门表的创建、提取和写入
//!
//! 这三个步骤都可以安全地重复执行。

use rusqlite::params;
use std::collections::BTreeSet;

use super::{count_rows, DepartmentRefactor, MigrationStep};
use crate::database::schema::{self, SchemaVersion, DEPARTMENTS_NAME_INDEX, DEPARTMENTS_TABLE};
use crate::errors::MigrationError;
use crate::models::DepartmentName;

impl DepartmentRefactor {
    /// 创建 departments 表和名称索引，已存在时不做任何事
    pub fn create_departments_table(&mut self) -> Result<(), MigrationError> {
        self.track(MigrationStep::CreateDepartmentsTable, |this| {
            tracing::info!("[部门迁移] 创建 departments 表...");
            let tx = this.conn.transaction()?;
            tx.execute_batch(&schema::departments_sql())?;
            tx.execute(DEPARTMENTS_NAME_INDEX, [])?;
            tx.commit()?;
            tracing::info!("[部门迁移] departments 表已就绪");
            Ok(())
        })
    }

    /// 提取商品中出现过的部门名（去重、非空、按名称排序）
    ///
    /// 同时记录每个部门的商品数作为验证基线。没有找到任何部门时返回空列表，
    /// 由调用方决定是否终止。
    pub fn extract_unique_departments(&mut self) -> Result<Vec<String>, MigrationError> {
        self.track(MigrationStep::ExtractUniqueDepartments, |this| {
            tracing::info!("[部门迁移] 从 products 表提取部门...");

            let sql = match schema::detect_schema_version(&this.conn)? {
                SchemaVersion::V1 => {
                    "SELECT department, COUNT(*) FROM products
                     WHERE department IS NOT NULL AND department <> ''
                     GROUP BY department
                     ORDER BY department"
                }
                // 已迁移的库通过外键读取，保证这一步可以重复执行
                SchemaVersion::V2 => {
                    "SELECT d.name, COUNT(p.id) FROM products p
                     JOIN departments d ON p.department_id = d.id
                     GROUP BY d.name
                     ORDER BY d.name"
                }
                SchemaVersion::Empty => {
                    return Err(MigrationError::PrerequisiteMissing(
                        "products 表不存在".to_string(),
                    ))
                }
                SchemaVersion::Unknown => {
                    return Err(MigrationError::PrerequisiteMissing(
                        "products 表既没有 department 列也没有 department_id 列".to_string(),
                    ))
                }
            };

            let mut stmt = this.conn.prepare(sql)?;
            let counts = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);

            let names: Vec<String> = counts.iter().map(|(name, _)| name.clone()).collect();
            this.baseline.per_department = counts.into_iter().collect();
            this.baseline.department_names = Some(names.clone());

            tracing::info!("[部门迁移] 找到 {} 个部门: {:?}", names.len(), names);
            Ok(names)
        })
    }

    /// 写入部门，已存在的名称会被跳过
    ///
    /// 返回本次新写入的行数。写入后确认每个名称都已在表中。
    pub fn populate_departments_table(&mut self, names: &[String]) -> Result<usize, MigrationError> {
        self.track(MigrationStep::PopulateDepartmentsTable, |this| {
            tracing::info!("[部门迁移] 写入 departments 表...");

            let distinct: BTreeSet<&str> = names.iter().map(String::as_str).collect();
            if distinct.is_empty() {
                return Err(MigrationError::PrerequisiteMissing(
                    "没有可写入的部门".to_string(),
                ));
            }
            let invalid: Vec<&str> = distinct
                .iter()
                .copied()
                .filter(|name| name.parse::<DepartmentName>().is_err())
                .collect();
            if !invalid.is_empty() {
                return Err(MigrationError::ConstraintViolation(format!(
                    "部门不在允许的集合 [{}] 内: {}",
                    DepartmentName::sql_value_list(),
                    invalid.join(", ")
                )));
            }

            let tx = this.conn.transaction()?;
            let mut inserted = 0;
            for name in &distinct {
                inserted += tx.execute(
                    "INSERT INTO departments (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                    params![name],
                )?;
            }
            tx.commit()?;

            let mut present = 0usize;
            for name in &distinct {
                let found: i64 = this.conn.query_row(
                    "SELECT COUNT(*) FROM departments WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                if found == 1 {
                    present += 1;
                }
            }
            if present != distinct.len() {
                return Err(MigrationError::ConstraintViolation(format!(
                    "部门写入后校验失败: 期望 {} 个，实际找到 {} 个",
                    distinct.len(),
                    present
                )));
            }

            let total = count_rows(&this.conn, DEPARTMENTS_TABLE)?;
            tracing::info!(
                "[部门迁移] departments 表共 {} 个部门（本次新增 {} 个）",
                total,
                inserted
            );

            let mut stmt = this
                .conn
                .prepare("SELECT id, name FROM departments ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                let (id, name) = row?;
                tracing::debug!("[部门迁移]   - ID {}: {}", id, name);
            }

            Ok(inserted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::MigrationState;
    use super::*;

    #[test]
    fn test_create_departments_table_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(1, 1), &dir);

        refactor.create_departments_table().unwrap();
        refactor.create_departments_table().unwrap();

        assert_eq!(refactor.state(), &MigrationState::DepartmentsTableReady);
        let indexes = schema::index_names(refactor.connection(), DEPARTMENTS_TABLE).unwrap();
        assert_eq!(indexes, vec!["idx_departments_name"]);
    }

    #[test]
    fn test_extract_unique_departments_records_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(2, 5), &dir);

        let names = refactor.extract_unique_departments().unwrap();

        assert_eq!(names, vec!["Men", "Women"]);
        assert_eq!(refactor.baseline().per_department.get("Men"), Some(&2));
        assert_eq!(refactor.baseline().per_department.get("Women"), Some(&5));
        // 提取不改变状态
        assert_eq!(refactor.state(), &MigrationState::NotStarted);
    }

    #[test]
    fn test_extract_ignores_null_and_empty_values() {
        let dir = tempfile::tempdir().unwrap();
        let conn = loose_v1_store(&[(1, "Men"), (2, ""), (3, "")]);
        conn.execute("UPDATE products SET department = NULL WHERE id = 2", [])
            .unwrap();
        let mut refactor = refactor_in(conn, &dir);

        assert_eq!(refactor.extract_unique_departments().unwrap(), vec!["Men"]);
    }

    #[test]
    fn test_extract_returns_empty_for_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(0, 0), &dir);
        assert!(refactor.extract_unique_departments().unwrap().is_empty());
    }

    #[test]
    fn test_populate_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(1, 1), &dir);
        refactor.create_departments_table().unwrap();

        let names = vec!["Men".to_string(), "Women".to_string()];
        assert_eq!(refactor.populate_departments_table(&names).unwrap(), 2);
        assert_eq!(refactor.populate_departments_table(&names).unwrap(), 0);

        assert_eq!(count_rows(refactor.connection(), DEPARTMENTS_TABLE).unwrap(), 2);
        assert_eq!(refactor.state(), &MigrationState::DepartmentsPopulated);
    }

    #[test]
    fn test_populate_accounts_for_previous_partial_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(1, 1), &dir);
        refactor.create_departments_table().unwrap();
        refactor
            .populate_departments_table(&["Men".to_string()])
            .unwrap();

        let inserted = refactor
            .populate_departments_table(&["Men".to_string(), "Women".to_string()])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(count_rows(refactor.connection(), DEPARTMENTS_TABLE).unwrap(), 2);
    }

    #[test]
    fn test_populate_rejects_unknown_department() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(1, 0), &dir);
        refactor.create_departments_table().unwrap();

        let err = refactor
            .populate_departments_table(&["Men".to_string(), "Kids".to_string()])
            .unwrap_err();
        assert!(matches!(err, MigrationError::ConstraintViolation(ref m) if m.contains("Kids")));
        assert!(refactor.state().is_aborted());
        assert_eq!(count_rows(refactor.connection(), DEPARTMENTS_TABLE).unwrap(), 0);
    }
}
