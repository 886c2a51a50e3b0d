//! 部门模型
//!
//! 部门是固定枚举集合中的目录分区。迁移前它只是 products 表上的一列文本，
//! 迁移后是独立的 departments 表。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CatalogError;

/// 部门名称
///
/// 集合是封闭的，DDL 中的 CHECK 约束也由它生成。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DepartmentName {
    Men,
    Women,
}

impl DepartmentName {
    /// 所有合法的部门名称
    pub const ALL: [DepartmentName; 2] = [DepartmentName::Men, DepartmentName::Women];

    /// 存储中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            DepartmentName::Men => "Men",
            DepartmentName::Women => "Women",
        }
    }

    /// 生成 SQL `IN (...)` 列表，例如 `'Men', 'Women'`
    pub fn sql_value_list() -> String {
        Self::ALL
            .iter()
            .map(|name| format!("'{}'", name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for DepartmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepartmentName {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Men" => Ok(DepartmentName::Men),
            "Women" => Ok(DepartmentName::Women),
            other => Err(CatalogError::InvalidDepartment(other.to_string())),
        }
    }
}

/// departments 表中的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// 部门及其商品数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentSummary {
    #[serde(flatten)]
    pub department: Department,
    pub product_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_name_round_trip() {
        for name in DepartmentName::ALL {
            assert_eq!(name.as_str().parse::<DepartmentName>().unwrap(), name);
        }
    }

    #[test]
    fn test_department_name_rejects_unknown() {
        let err = "Kids".parse::<DepartmentName>().unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDepartment(ref v) if v == "Kids"));
        // 大小写敏感，与存储中的 CHECK 约束一致
        assert!("men".parse::<DepartmentName>().is_err());
    }

    #[test]
    fn test_sql_value_list() {
        assert_eq!(DepartmentName::sql_value_list(), "'Men', 'Women'");
    }
}
