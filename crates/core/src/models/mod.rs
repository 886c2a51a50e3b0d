//! 数据模型

pub mod department;
pub mod product;

pub use department::{Department, DepartmentName, DepartmentSummary};
pub use product::{NewProduct, Page, Product, ProductQuery, DISTRIBUTION_CENTER_RANGE, SKU_LENGTH};
