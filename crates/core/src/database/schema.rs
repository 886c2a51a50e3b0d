//! 表结构定义
//!
//! 包含旧结构（V1，department 为文本列）和规范化结构（V2，department_id
//! 外键引用 departments 表）的 DDL、索引定义，以及结构版本检测和结构描述。

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::models::DepartmentName;

pub const PRODUCTS_TABLE: &str = "products";
pub const DEPARTMENTS_TABLE: &str = "departments";
/// 重建商品表时使用的临时表名
pub const PRODUCTS_STAGING_TABLE: &str = "products_new";

/// V1 商品表的二级索引
pub const V1_PRODUCT_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_products_brand ON products(brand)",
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
    "CREATE INDEX IF NOT EXISTS idx_products_department ON products(department)",
    "CREATE INDEX IF NOT EXISTS idx_products_price ON products(retail_price)",
];

/// V2 商品表的二级索引
pub const V2_PRODUCT_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_products_brand ON products(brand)",
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
    "CREATE INDEX IF NOT EXISTS idx_products_department_id ON products(department_id)",
    "CREATE INDEX IF NOT EXISTS idx_products_price ON products(retail_price)",
];

pub const DEPARTMENTS_NAME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_departments_name ON departments(name)";

/// V1 商品表
pub fn products_v1_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY,
            cost REAL NOT NULL CHECK (cost >= 0),
            category TEXT NOT NULL CHECK (length(category) <= 50),
            name TEXT CHECK (length(name) <= 500),
            brand TEXT CHECK (length(brand) <= 100),
            retail_price REAL NOT NULL CHECK (retail_price >= 0),
            department TEXT NOT NULL CHECK (department IN ({})),
            sku TEXT NOT NULL CHECK (length(sku) = 32) UNIQUE,
            distribution_center_id INTEGER NOT NULL CHECK (distribution_center_id BETWEEN 1 AND 10)
        )",
        DepartmentName::sql_value_list()
    )
}

/// 部门表
pub fn departments_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS departments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE CHECK (name IN ({})),
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        DepartmentName::sql_value_list()
    )
}

/// V2 商品表，`table` 为表名（迁移时先建在临时表名下）
pub fn products_v2_sql(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            id INTEGER PRIMARY KEY,
            cost REAL NOT NULL CHECK (cost >= 0),
            category TEXT NOT NULL CHECK (length(category) <= 50),
            name TEXT CHECK (length(name) <= 500),
            brand TEXT CHECK (length(brand) <= 100),
            retail_price REAL NOT NULL CHECK (retail_price >= 0),
            department_id INTEGER NOT NULL,
            sku TEXT NOT NULL CHECK (length(sku) = 32) UNIQUE,
            distribution_center_id INTEGER NOT NULL CHECK (distribution_center_id BETWEEN 1 AND 10),
            FOREIGN KEY (department_id) REFERENCES departments(id)
        )"
    )
}

/// 创建 V1 结构（旧的单表结构）
pub fn create_v1_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&products_v1_sql())?;
    for sql in V1_PRODUCT_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// 直接创建 V2 结构（全新库使用，不经过迁移）
pub fn create_v2_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&departments_sql())?;
    conn.execute(DEPARTMENTS_NAME_INDEX, [])?;
    if !table_exists(conn, PRODUCTS_TABLE)? {
        conn.execute_batch(&products_v2_sql(PRODUCTS_TABLE))?;
    }
    for sql in V2_PRODUCT_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

// ============================================================================
// 结构检测
// ============================================================================

/// 存储的结构版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    /// 没有 products 表
    Empty,
    /// department 文本列
    V1,
    /// department_id 外键
    V2,
    /// 有 products 表但两种列都没有
    Unknown,
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// 检测 products 表的结构版本
pub fn detect_schema_version(conn: &Connection) -> rusqlite::Result<SchemaVersion> {
    if !table_exists(conn, PRODUCTS_TABLE)? {
        return Ok(SchemaVersion::Empty);
    }

    let columns = table_info(conn, PRODUCTS_TABLE)?;
    let has = |name: &str| columns.iter().any(|c| c.name == name);

    Ok(if has("department") {
        SchemaVersion::V1
    } else if has("department_id") {
        SchemaVersion::V2
    } else {
        SchemaVersion::Unknown
    })
}

/// 列信息（PRAGMA table_info 的一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// 表信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// 按 "名称 类型 约束" 的格式渲染，每列一行
    pub fn render(&self) -> String {
        let mut out = format!("Table: {}\n", self.name);
        for col in &self.columns {
            let mut constraints = Vec::new();
            if col.not_null {
                constraints.push("NOT NULL".to_string());
            }
            if col.primary_key {
                constraints.push("PRIMARY KEY".to_string());
            }
            if let Some(default) = &col.default_value {
                constraints.push(format!("DEFAULT {default}"));
            }
            out.push_str(&format!(
                "  {:<24} {:<12} {}\n",
                col.name,
                col.type_name,
                constraints.join(" ")
            ));
        }
        out
    }
}

pub fn table_info(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
    // PRAGMA 不支持参数绑定，表名只来自 sqlite_master 或常量
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\"")))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                type_name: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// 列出所有用户表及其列
pub fn describe_schema(conn: &Connection) -> rusqlite::Result<Vec<TableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    names
        .into_iter()
        .map(|name| {
            let columns = table_info(conn, &name)?;
            Ok(TableInfo { name, columns })
        })
        .collect()
}

/// 列出某张表上的索引名
pub fn index_names(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'index' AND tbl_name = ?1 AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
