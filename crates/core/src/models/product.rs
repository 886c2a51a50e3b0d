//! 商品模型

use serde::{Deserialize, Serialize};

/// SKU 固定长度
pub const SKU_LENGTH: usize = 32;

/// 配送中心编号的合法范围
pub const DISTRIBUTION_CENTER_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

/// 旧结构（V1）下的一条商品记录，department 仍是文本列
///
/// 只用于写入测试夹具和初始数据；CSV 导入不在本仓库范围内。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: i64,
    pub cost: f64,
    pub category: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub retail_price: f64,
    pub department: String,
    pub sku: String,
    pub distribution_center_id: i64,
}

/// 规范化结构（V2）下的商品，附带通过 department_id 关联出的部门名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub cost: f64,
    pub category: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub retail_price: f64,
    pub department_id: i64,
    pub department: String,
    pub sku: String,
    pub distribution_center_id: i64,
}

impl Product {
    /// 检查字段是否满足 V1 表上声明的约束，返回不满足的描述
    pub fn plausibility_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.sku.chars().count() != SKU_LENGTH {
            issues.push(format!("商品 {} 的 SKU 长度为 {}", self.id, self.sku.chars().count()));
        }
        if self.cost < 0.0 || self.retail_price < 0.0 {
            issues.push(format!("商品 {} 的价格为负数", self.id));
        }
        if !DISTRIBUTION_CENTER_RANGE.contains(&self.distribution_center_id) {
            issues.push(format!(
                "商品 {} 的配送中心 {} 超出范围",
                self.id, self.distribution_center_id
            ));
        }
        if self.department.parse::<super::DepartmentName>().is_err() {
            issues.push(format!("商品 {} 的部门 {} 无效", self.id, self.department));
        }
        issues
    }
}

/// 商品列表查询条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductQuery {
    /// 页码，从 1 开始
    pub page: Option<u32>,
    /// 每页数量，默认 10，最大 100
    pub per_page: Option<u32>,
    pub department: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl ProductQuery {
    pub const DEFAULT_PER_PAGE: u32 = 10;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: i64) -> Self {
        let per_page_i = i64::from(per_page.max(1));
        Self {
            items,
            page,
            per_page,
            total,
            total_pages: (total + per_page_i - 1) / per_page_i,
        }
    }

    pub fn has_next(&self) -> bool {
        i64::from(self.page) < self.total_pages
    }
}
