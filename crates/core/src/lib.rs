//! 商品目录核心库
//!
//! 包含数据模型、错误类型、表结构、数据访问对象，以及把 department
//! 文本列规范化为 departments 表的迁移。

pub mod database;
pub mod errors;
pub mod models;

pub use database::dao::{CatalogStats, DepartmentDao, ProductDao};
pub use database::migration::{
    AbortHandle, DepartmentRefactor, MigrationReport, MigrationState, MigrationStep,
    RefactorOptions, VerificationReport,
};
pub use database::schema::{SchemaVersion, TableInfo};
pub use errors::{CatalogError, MigrationError, StepFailure};
pub use models::{Department, DepartmentName, NewProduct, Page, Product, ProductQuery};
