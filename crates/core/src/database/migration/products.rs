//! 步骤 5：重建 products 表
//!
//! 整个步骤在一个事务中完成：建临时表、按部门名等值关联复制、核对行数、
//! 删除旧表、改名、重建索引、外键检查。任何一步失败都整体回滚，
//! 旧表保持原样。SQLite 的 DDL 是事务性的，所以删表和改名之间不存在
//! 没有可用商品表的中间状态。

use rusqlite::Connection;

use super::{classify_sql_error, count_rows, DepartmentRefactor, MigrationStep};
use crate::database::schema::{
    self, SchemaVersion, DEPARTMENTS_TABLE, PRODUCTS_STAGING_TABLE, PRODUCTS_TABLE,
    V2_PRODUCT_INDEXES,
};
use crate::errors::MigrationError;

impl DepartmentRefactor {
    /// 把 products 表重建为引用 departments 的规范化结构
    ///
    /// 返回迁移的商品行数。这一步不是幂等的：已经迁移过的库会以
    /// `PrerequisiteMissing` 拒绝执行。
    pub fn update_products_table(&mut self) -> Result<usize, MigrationError> {
        self.track(MigrationStep::UpdateProductsTable, |this| {
            tracing::info!("[部门迁移] 重建 products 表并建立外键...");

            let abort = this.abort.clone();
            let tx = this.conn.transaction()?;

            ensure_rebuild_prerequisites(&tx)?;

            let source_count = count_rows(&tx, PRODUCTS_TABLE)?;
            ensure_every_product_matches(&tx)?;

            tx.execute_batch(&format!("DROP TABLE IF EXISTS {PRODUCTS_STAGING_TABLE}"))?;
            tx.execute_batch(&schema::products_v2_sql(PRODUCTS_STAGING_TABLE))?;

            let copied = tx
                .execute(
                    &format!(
                        "INSERT INTO {PRODUCTS_STAGING_TABLE} (
                            id, cost, category, name, brand, retail_price,
                            department_id, sku, distribution_center_id
                        )
                        SELECT p.id, p.cost, p.category, p.name, p.brand, p.retail_price,
                               d.id, p.sku, p.distribution_center_id
                        FROM products p
                        JOIN departments d ON p.department = d.name"
                    ),
                    [],
                )
                .map_err(|e| classify_sql_error(e, "复制商品到新表失败"))?;

            // 删除旧表之前先确认没有丢行或重复
            if copied as i64 != source_count {
                return Err(MigrationError::ConstraintViolation(format!(
                    "复制商品行数不一致: 源表 {} 条，新表 {} 条",
                    source_count, copied
                )));
            }

            tx.execute_batch(&format!(
                "DROP TABLE {PRODUCTS_TABLE};
                 ALTER TABLE {PRODUCTS_STAGING_TABLE} RENAME TO {PRODUCTS_TABLE};"
            ))?;
            for sql in V2_PRODUCT_INDEXES {
                tx.execute(sql, [])?;
            }

            let violations = foreign_key_violations(&tx)?;
            if violations > 0 {
                return Err(MigrationError::ConstraintViolation(format!(
                    "外键检查发现 {violations} 条商品引用了不存在的部门"
                )));
            }

            #[cfg(test)]
            if this.abort_before_commit {
                abort.abort();
            }

            if abort.is_aborted() {
                return Err(MigrationError::Aborted(
                    "提交 products 重建事务前收到中止信号，已回滚".to_string(),
                ));
            }

            tx.commit()?;
            tracing::info!("[部门迁移] products 表已迁移 {} 条商品并建立外键", copied);
            Ok(copied)
        })
    }
}

fn ensure_rebuild_prerequisites(conn: &Connection) -> Result<(), MigrationError> {
    match schema::detect_schema_version(conn)? {
        SchemaVersion::V1 => {}
        SchemaVersion::V2 => {
            return Err(MigrationError::PrerequisiteMissing(
                "products 表已经是 department_id 结构，不能重复重建".to_string(),
            ))
        }
        SchemaVersion::Empty => {
            return Err(MigrationError::PrerequisiteMissing(
                "products 表不存在".to_string(),
            ))
        }
        SchemaVersion::Unknown => {
            return Err(MigrationError::PrerequisiteMissing(
                "products 表缺少 department 列".to_string(),
            ))
        }
    }
    if !schema::table_exists(conn, DEPARTMENTS_TABLE)? {
        return Err(MigrationError::PrerequisiteMissing(
            "departments 表不存在".to_string(),
        ));
    }
    Ok(())
}

/// 每个商品的部门都必须能在 departments 中找到，否则关联复制会静默丢行
fn ensure_every_product_matches(conn: &Connection) -> Result<(), MigrationError> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(p.department, '<NULL>'), COUNT(*)
         FROM products p
         LEFT JOIN departments d ON p.department = d.name
         WHERE d.id IS NULL
         GROUP BY p.department
         ORDER BY p.department",
    )?;
    let unmatched = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    if unmatched.is_empty() {
        return Ok(());
    }

    let total: i64 = unmatched.iter().map(|(_, n)| n).sum();
    let detail = unmatched
        .iter()
        .map(|(name, n)| format!("{name:?} x{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(MigrationError::ConstraintViolation(format!(
        "{total} 条商品的部门在 departments 表中没有匹配: {detail}"
    )))
}

fn foreign_key_violations(conn: &Connection) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_check({PRODUCTS_TABLE})"))?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::MigrationState;
    use super::*;

    fn prepared(conn: Connection, dir: &tempfile::TempDir) -> DepartmentRefactor {
        let mut refactor = refactor_in(conn, dir);
        refactor.create_departments_table().unwrap();
        let names = refactor.extract_unique_departments().unwrap();
        refactor.populate_departments_table(&names).unwrap();
        refactor
    }

    #[test]
    fn test_rebuild_preserves_rows_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = prepared(v1_store(3, 2), &dir);

        assert_eq!(refactor.update_products_table().unwrap(), 5);
        assert_eq!(refactor.state(), &MigrationState::ProductsTableMigrated);

        let conn = refactor.connection();
        assert_eq!(
            schema::detect_schema_version(conn).unwrap(),
            SchemaVersion::V2
        );
        assert!(!schema::table_exists(conn, PRODUCTS_STAGING_TABLE).unwrap());

        // id 1..=3 为 Men，4..=5 为 Women
        let department_of = |id: i64| -> String {
            conn.query_row(
                "SELECT d.name FROM products p JOIN departments d ON p.department_id = d.id
                 WHERE p.id = ?1",
                [id],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(department_of(1), "Men");
        assert_eq!(department_of(3), "Men");
        assert_eq!(department_of(4), "Women");
    }

    #[test]
    fn test_rebuild_recreates_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = prepared(v1_store(1, 1), &dir);
        refactor.update_products_table().unwrap();

        let indexes = schema::index_names(refactor.connection(), PRODUCTS_TABLE).unwrap();
        assert_eq!(
            indexes,
            vec![
                "idx_products_brand",
                "idx_products_category",
                "idx_products_department_id",
                "idx_products_price",
            ]
        );
    }

    #[test]
    fn test_rebuild_enforces_foreign_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = prepared(v1_store(1, 1), &dir);
        refactor.update_products_table().unwrap();

        let result = refactor.connection().execute(
            "INSERT INTO products VALUES (100, 1.0, 'Tops', NULL, NULL, 2.0, 999,
                                          '99999999999999999999999999999999', 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unmatched_department_fails_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let conn = loose_v1_store(&[(1, "Men"), (2, "Women"), (3, "Kids")]);
        let mut refactor = refactor_in(conn, &dir);
        refactor.create_departments_table().unwrap();
        refactor
            .populate_departments_table(&["Men".to_string(), "Women".to_string()])
            .unwrap();

        let err = refactor.update_products_table().unwrap_err();
        assert!(matches!(err, MigrationError::ConstraintViolation(ref m) if m.contains("Kids")));

        let conn = refactor.connection();
        assert_eq!(
            schema::detect_schema_version(conn).unwrap(),
            SchemaVersion::V1
        );
        assert_eq!(count_rows(conn, PRODUCTS_TABLE).unwrap(), 3);
        assert!(!schema::table_exists(conn, PRODUCTS_STAGING_TABLE).unwrap());
    }

    #[test]
    fn test_constraint_failure_during_copy_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let conn = loose_v1_store(&[(1, "Men"), (2, "Women")]);
        // 宽松表里混入了违反 SKU 长度约束的行
        conn.execute("UPDATE products SET sku = 'short' WHERE id = 2", [])
            .unwrap();
        let mut refactor = prepared(conn, &dir);

        let err = refactor.update_products_table().unwrap_err();
        assert!(matches!(err, MigrationError::ConstraintViolation(_)));
        assert_eq!(
            schema::detect_schema_version(refactor.connection()).unwrap(),
            SchemaVersion::V1
        );
        assert_eq!(count_rows(refactor.connection(), PRODUCTS_TABLE).unwrap(), 2);
    }

    #[test]
    fn test_abort_during_rebuild_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = prepared(v1_store(3, 2), &dir);
        refactor.abort_before_commit = true;

        let err = refactor.update_products_table().unwrap_err();
        assert!(matches!(err, MigrationError::Aborted(_)));
        assert!(matches!(
            refactor.state(),
            MigrationState::Aborted {
                step: MigrationStep::UpdateProductsTable,
                ..
            }
        ));

        let conn = refactor.connection();
        assert_eq!(
            schema::detect_schema_version(conn).unwrap(),
            SchemaVersion::V1
        );
        assert_eq!(count_rows(conn, PRODUCTS_TABLE).unwrap(), 5);
        assert!(!schema::table_exists(conn, PRODUCTS_STAGING_TABLE).unwrap());
        assert!(schema::index_names(conn, PRODUCTS_TABLE)
            .unwrap()
            .contains(&"idx_products_department".to_string()));
    }

    #[test]
    fn test_second_rebuild_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = prepared(v1_store(1, 1), &dir);
        refactor.update_products_table().unwrap();

        let err = refactor.update_products_table().unwrap_err();
        assert!(matches!(err, MigrationError::PrerequisiteMissing(_)));
        assert_eq!(count_rows(refactor.connection(), PRODUCTS_TABLE).unwrap(), 2);
    }

    #[test]
    fn test_rebuild_requires_departments_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut refactor = refactor_in(v1_store(1, 1), &dir);
        let err = refactor.update_products_table().unwrap_err();
        assert!(matches!(err, MigrationError::PrerequisiteMissing(ref m) if m.contains("departments")));
    }

    mod properties {
        use super::*;
        use crate::database::dao::ProductDao;
        use proptest::prelude::*;

        fn arb_departments() -> impl Strategy<Value = Vec<bool>> {
            prop::collection::vec(any::<bool>(), 1..40)
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_rebuild_preserves_counts_and_identity(is_men in arb_departments()) {
                let dir = tempfile::tempdir().unwrap();
                let conn = crate::database::open_in_memory().unwrap();
                schema::create_v1_schema(&conn).unwrap();
                for (i, men) in is_men.iter().enumerate() {
                    let department = if *men { "Men" } else { "Women" };
                    ProductDao::insert_legacy(&conn, &product(i as i64 + 1, department)).unwrap();
                }
                let men_count = is_men.iter().filter(|m| **m).count() as i64;

                let mut refactor = prepared(conn, &dir);
                let copied = refactor.update_products_table().unwrap();
                prop_assert_eq!(copied, is_men.len());

                let conn = refactor.connection();
                for (i, men) in is_men.iter().enumerate() {
                    let name: String = conn
                        .query_row(
                            "SELECT d.name FROM products p JOIN departments d
                             ON p.department_id = d.id WHERE p.id = ?1",
                            [i as i64 + 1],
                            |row| row.get(0),
                        )
                        .unwrap();
                    prop_assert_eq!(name, if *men { "Men" } else { "Women" });
                }

                let men_after: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM products p JOIN departments d
                         ON p.department_id = d.id WHERE d.name = 'Men'",
                        [],
                        |row| row.get(0),
                    )
                    .unwrap();
                prop_assert_eq!(men_after, men_count);
            }
        }
    }
}
