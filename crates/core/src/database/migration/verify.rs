//! 步骤 6：验证迁移结果
//!
//! 只报告，不撤销已完成的变更。是否从备份恢复由操作者决定。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{count_rows, DepartmentRefactor, MigrationState, MigrationStep};
use crate::database::dao::ProductDao;
use crate::database::schema::{self, SchemaVersion, DEPARTMENTS_TABLE, PRODUCTS_TABLE};
use crate::errors::MigrationError;
use crate::models::Product;

/// 验证报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub department_count: i64,
    /// 期望的部门数（来自提取步骤，单独验证时为空）
    pub expected_departments: Option<usize>,
    pub product_count: i64,
    /// 迁移前的商品数（来自备份步骤，单独验证时为空）
    pub expected_products: Option<i64>,
    /// 能关联到部门的商品数
    pub joined_products: i64,
    /// 关联不到部门的商品数
    pub orphan_products: i64,
    pub per_department: BTreeMap<String, i64>,
    pub samples: Vec<Product>,
    pub mismatches: Vec<String>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl DepartmentRefactor {
    /// 检查迁移后的库
    ///
    /// 比对部门数、商品数、外键关联和各部门商品数，并抽样检查字段。
    /// 不一致只记录在报告里，状态进入 `Verified { passed: false }`。
    pub fn verify_refactoring(&mut self) -> Result<VerificationReport, MigrationError> {
        let report = self.track(MigrationStep::VerifyRefactoring, |this| {
            tracing::info!("[部门迁移] 验证迁移结果...");

            if schema::detect_schema_version(&this.conn)? != SchemaVersion::V2 {
                return Err(MigrationError::PrerequisiteMissing(
                    "products 表尚未迁移为 department_id 结构".to_string(),
                ));
            }

            let conn = &this.conn;
            let baseline = &this.baseline;
            let mut mismatches = Vec::new();

            let department_count = count_rows(conn, DEPARTMENTS_TABLE)?;
            let expected_departments = baseline.department_names.as_ref().map(Vec::len);
            tracing::info!("[部门迁移] departments 表: {} 个部门", department_count);
            if let Some(expected) = expected_departments {
                if department_count != expected as i64 {
                    mismatches.push(format!(
                        "部门数不一致: 期望 {expected}，实际 {department_count}"
                    ));
                }
            }

            let product_count = count_rows(conn, PRODUCTS_TABLE)?;
            tracing::info!("[部门迁移] products 表: {} 条商品", product_count);
            if let Some(expected) = baseline.product_count {
                if product_count != expected {
                    mismatches.push(format!(
                        "商品数不一致: 迁移前 {expected}，迁移后 {product_count}"
                    ));
                }
            }

            let joined_products: i64 = conn.query_row(
                "SELECT COUNT(*) FROM products p JOIN departments d ON p.department_id = d.id",
                [],
                |row| row.get(0),
            )?;
            let orphan_products: i64 = conn.query_row(
                "SELECT COUNT(*) FROM products p
                 LEFT JOIN departments d ON p.department_id = d.id
                 WHERE d.id IS NULL",
                [],
                |row| row.get(0),
            )?;
            tracing::info!("[部门迁移] 有效外键关联: {}", joined_products);
            if orphan_products > 0 {
                mismatches.push(format!("{orphan_products} 条商品关联不到部门"));
            }
            if joined_products != product_count {
                mismatches.push(format!(
                    "外键关联数 {joined_products} 与商品数 {product_count} 不一致"
                ));
            }

            let mut stmt = conn.prepare(
                "SELECT d.name, COUNT(p.id) FROM products p
                 JOIN departments d ON p.department_id = d.id
                 GROUP BY d.name ORDER BY d.name",
            )?;
            let per_department: BTreeMap<String, i64> = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<_, _>>()?;
            if !baseline.per_department.is_empty() && per_department != baseline.per_department {
                mismatches.push(format!(
                    "各部门商品数不一致: 迁移前 {:?}，迁移后 {:?}",
                    baseline.per_department, per_department
                ));
            }

            let mut stmt = conn.prepare(
                "SELECT p.id, p.cost, p.category, p.name, p.brand, p.retail_price,
                        p.department_id, d.name, p.sku, p.distribution_center_id
                 FROM products p
                 JOIN departments d ON p.department_id = d.id
                 ORDER BY p.id
                 LIMIT ?1",
            )?;
            let samples = stmt
                .query_map([this.options.sample_size as i64], ProductDao::map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            for product in &samples {
                tracing::info!(
                    "[部门迁移]   - ID {}: {} ({}) - {} - ${:.2}",
                    product.id,
                    product.name.as_deref().unwrap_or("-"),
                    product.brand.as_deref().unwrap_or("-"),
                    product.department,
                    product.retail_price
                );
                mismatches.extend(product.plausibility_issues());
            }

            for mismatch in &mismatches {
                tracing::warn!("[部门迁移] 验证不一致: {}", mismatch);
            }

            Ok(VerificationReport {
                department_count,
                expected_departments,
                product_count,
                expected_products: baseline.product_count,
                joined_products,
                orphan_products,
                per_department,
                samples,
                mismatches,
            })
        })?;

        self.state = MigrationState::Verified {
            passed: report.passed(),
        };
        if report.passed() {
            tracing::info!("[部门迁移] 迁移验证通过");
        }
        Ok(report)
    }
}
