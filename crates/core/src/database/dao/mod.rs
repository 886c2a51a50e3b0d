//! 数据访问对象

pub mod department_dao;
pub mod product_dao;

pub use department_dao::{CatalogStats, DepartmentDao};
pub use product_dao::ProductDao;
