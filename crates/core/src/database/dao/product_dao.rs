//! 商品数据访问层
//!
//! 提供规范化结构下的商品查询：
//! - 按 ID 获取（关联部门名）
//! - 分页列表，支持部门、分类、品牌等值过滤和价格区间过滤
//!
//! 另外保留旧结构的写入方法，用于准备迁移前的数据。

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::errors::CatalogError;
use crate::models::{DepartmentName, NewProduct, Page, Product, ProductQuery};

const PRODUCT_COLUMNS: &str = "p.id, p.cost, p.category, p.name, p.brand, p.retail_price,
                               p.department_id, d.name, p.sku, p.distribution_center_id";

/// 商品 DAO
pub struct ProductDao;

impl ProductDao {
    /// 写入一条旧结构（V1）的商品
    pub fn insert_legacy(conn: &Connection, product: &NewProduct) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO products (
                id, cost, category, name, brand, retail_price,
                department, sku, distribution_center_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                product.id,
                product.cost,
                product.category,
                product.name,
                product.brand,
                product.retail_price,
                product.department,
                product.sku,
                product.distribution_center_id,
            ],
        )?;
        Ok(())
    }

    /// 获取单个商品
    pub fn get(conn: &Connection, id: i64) -> Result<Option<Product>, CatalogError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM products p
             JOIN departments d ON p.department_id = d.id
             WHERE p.id = ?1"
        );
        let product = conn.query_row(&sql, [id], Self::map_row).optional()?;
        Ok(product)
    }

    /// 商品总数
    pub fn count(conn: &Connection) -> Result<i64, CatalogError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?)
    }

    /// 分页查询商品，按 ID 排序
    pub fn list(conn: &Connection, query: &ProductQuery) -> Result<Page<Product>, CatalogError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(department) = &query.department {
            let department: DepartmentName = department.parse()?;
            clauses.push("d.name = ?");
            values.push(Value::Text(department.as_str().to_string()));
        }
        if let Some(category) = &query.category {
            clauses.push("p.category = ?");
            values.push(Value::Text(category.clone()));
        }
        if let Some(brand) = &query.brand {
            clauses.push("p.brand = ?");
            values.push(Value::Text(brand.clone()));
        }
        if let Some(min_price) = query.min_price {
            clauses.push("p.retail_price >= ?");
            values.push(Value::Real(min_price));
        }
        if let Some(max_price) = query.max_price {
            clauses.push("p.retail_price <= ?");
            values.push(Value::Real(max_price));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM products p
                 JOIN departments d ON p.department_id = d.id
                 {where_sql}"
            ),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let page = query.page();
        let per_page = query.per_page();
        values.push(Value::Integer(i64::from(per_page)));
        values.push(Value::Integer(query.offset() as i64));

        let mut stmt = conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM products p
             JOIN departments d ON p.department_id = d.id
             {where_sql}
             ORDER BY p.id
             LIMIT ? OFFSET ?"
        ))?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, page, per_page, total))
    }

    /// 按名称、品牌或分类模糊搜索，按名称排序
    pub fn search(conn: &Connection, q: &str) -> Result<Vec<Product>, CatalogError> {
        let q = q.trim();
        if q.is_empty() {
            return Err(CatalogError::InvalidQuery("搜索关键词不能为空".to_string()));
        }
        let pattern = format!("%{q}%");

        let mut stmt = conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM products p
             JOIN departments d ON p.department_id = d.id
             WHERE p.name LIKE ?1 OR p.brand LIKE ?1 OR p.category LIKE ?1
             ORDER BY p.name, p.id"
        ))?;
        let products = stmt
            .query_map([&pattern], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    /// 分页列出某个部门的商品，按名称排序
    ///
    /// 只使用 `query` 的分页参数。部门不存在时返回 `NotFound`。
    pub fn list_by_department(
        conn: &Connection,
        department_id: i64,
        query: &ProductQuery,
    ) -> Result<Page<Product>, CatalogError> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM departments WHERE id = ?1",
                [department_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(CatalogError::NotFound(format!("部门 {department_id}")));
        }

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM products WHERE department_id = ?1",
            [department_id],
            |row| row.get(0),
        )?;

        let page = query.page();
        let per_page = query.per_page();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS}
             FROM products p
             JOIN departments d ON p.department_id = d.id
             WHERE d.id = ?1
             ORDER BY p.name, p.id
             LIMIT ?2 OFFSET ?3"
        ))?;
        let items = stmt
            .query_map(
                params![department_id, i64::from(per_page), query.offset() as i64],
                Self::map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, page, per_page, total))
    }

    pub(crate) fn map_row(row: &rusqlite::Row) -> Result<Product, rusqlite::Error> {
        Ok(Product {
            id: row.get(0)?,
            cost: row.get(1)?,
            category: row.get(2)?,
            name: row.get(3)?,
            brand: row.get(4)?,
            retail_price: row.get(5)?,
            department_id: row.get(6)?,
            department: row.get(7)?,
            sku: row.get(8)?,
            distribution_center_id: row.get(9)?,
        })
    }
}

// ============================================================================
// 测试
// ============================================================================
