//! 错误类型模块
//!
//! 定义商品目录存储中的各种错误类型。
//!
//! ## 模块结构
//! - `catalog_error`: 目录相关错误（MigrationError, CatalogError）

pub mod catalog_error;

// 重新导出常用错误类型
pub use catalog_error::{CatalogError, MigrationError, StepFailure};
