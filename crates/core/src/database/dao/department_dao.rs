//! 部门数据访问层

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::CatalogError;
use crate::models::{Department, DepartmentName, DepartmentSummary};

/// 目录统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_products: i64,
    pub total_categories: i64,
    pub total_brands: i64,
    pub total_departments: i64,
    pub avg_retail_price: Option<f64>,
    pub min_retail_price: Option<f64>,
    pub max_retail_price: Option<f64>,
    pub products_by_department: BTreeMap<String, i64>,
}

/// 部门 DAO
pub struct DepartmentDao;

impl DepartmentDao {
    /// 列出所有部门及其商品数，按名称排序
    pub fn list(conn: &Connection) -> Result<Vec<DepartmentSummary>, CatalogError> {
        let mut stmt = conn.prepare(
            "SELECT d.id, d.name, d.created_at, d.updated_at, COUNT(p.id)
             FROM departments d
             LEFT JOIN products p ON p.department_id = d.id
             GROUP BY d.id, d.name, d.created_at, d.updated_at
             ORDER BY d.name",
        )?;
        let departments = stmt
            .query_map([], Self::map_summary_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(departments)
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<DepartmentSummary>, CatalogError> {
        let summary = conn
            .query_row(
                "SELECT d.id, d.name, d.created_at, d.updated_at, COUNT(p.id)
                 FROM departments d
                 LEFT JOIN products p ON p.department_id = d.id
                 WHERE d.id = ?1
                 GROUP BY d.id, d.name, d.created_at, d.updated_at",
                [id],
                Self::map_summary_row,
            )
            .optional()?;
        Ok(summary)
    }

    /// 按名称获取部门，名称不在允许集合内时返回 InvalidDepartment
    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<Department>, CatalogError> {
        let name: DepartmentName = name.parse()?;
        let department = conn
            .query_row(
                "SELECT id, name, created_at, updated_at FROM departments WHERE name = ?1",
                [name.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(department)
    }

    /// 目录统计
    pub fn stats(conn: &Connection) -> Result<CatalogStats, CatalogError> {
        let (total_products, total_categories, total_brands, avg, min, max) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT category), COUNT(DISTINCT brand),
                    AVG(retail_price), MIN(retail_price), MAX(retail_price)
             FROM products",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                ))
            },
        )?;

        let departments = Self::list(conn)?;
        let products_by_department = departments
            .iter()
            .map(|d| (d.department.name.clone(), d.product_count))
            .collect();

        Ok(CatalogStats {
            total_products,
            total_categories,
            total_brands,
            total_departments: departments.len() as i64,
            avg_retail_price: avg,
            min_retail_price: min,
            max_retail_price: max,
            products_by_department,
        })
    }

    fn map_row(row: &rusqlite::Row) -> Result<Department, rusqlite::Error> {
        Ok(Department {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            updated_at: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        })
    }

    fn map_summary_row(row: &rusqlite::Row) -> Result<DepartmentSummary, rusqlite::Error> {
        Ok(DepartmentSummary {
            department: Self::map_row(row)?,
            product_count: row.get(4)?,
        })
    }
}
