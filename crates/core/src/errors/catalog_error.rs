//! 商品目录相关错误类型
//!
//! 定义商品目录存储中的错误类型，包括：
//! - MigrationError（部门规范化迁移错误）
//! - StepFailure（带步骤名的迁移失败）
//! - CatalogError（目录查询错误）
//!
//! 所有错误都使用 thiserror 派生 Error trait，并实现 Serialize，
//! 以便命令行输出 JSON 报告时直接序列化为错误信息字符串。

use thiserror::Error;

use crate::database::migration::MigrationStep;

// ============================================================================
// 迁移错误
// ============================================================================

/// 部门规范化迁移错误
///
/// 涵盖备份、前置条件、约束校验、验证和中止等情况。
#[derive(Error, Debug)]
pub enum MigrationError {
    /// 备份失败（致命，任何变更之前停止）
    #[error("备份失败: {0}")]
    BackupFailure(String),

    /// 前置条件缺失（例如没有找到任何部门）
    #[error("前置条件缺失: {0}")]
    PrerequisiteMissing(String),

    /// 约束违反（重建商品表时有行不满足约束）
    #[error("约束违反: {0}")]
    ConstraintViolation(String),

    /// 迁移后验证不一致（迁移已生效，需人工决定是否从备份恢复）
    #[error("迁移验证不一致: {}", .0.join("; "))]
    VerificationMismatch(Vec<String>),

    /// 迁移被中止
    #[error("迁移已中止: {0}")]
    Aborted(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),
}

impl From<MigrationError> for String {
    fn from(err: MigrationError) -> Self {
        err.to_string()
    }
}

impl serde::Serialize for MigrationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// 迁移步骤失败
///
/// `run_migration` 用它包装每个步骤的错误，保证错误信息里总带有步骤名。
#[derive(Error, Debug)]
#[error("步骤 {step} 失败: {source}")]
pub struct StepFailure {
    pub step: MigrationStep,
    #[source]
    pub source: MigrationError,
}

impl StepFailure {
    pub fn new(step: MigrationStep, source: MigrationError) -> Self {
        Self { step, source }
    }

    /// 迁移是否已经生效（只有验证阶段的失败发生在变更之后）
    pub fn is_post_mutation(&self) -> bool {
        matches!(self.source, MigrationError::VerificationMismatch(_))
    }
}

impl From<StepFailure> for String {
    fn from(err: StepFailure) -> Self {
        err.to_string()
    }
}

impl serde::Serialize for StepFailure {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

// ============================================================================
// 目录查询错误
// ============================================================================

/// 目录查询错误
#[derive(Error, Debug)]
pub enum CatalogError {
    /// 记录不存在
    #[error("记录不存在: {0}")]
    NotFound(String),

    /// 部门名称不在允许的集合内
    #[error("无效的部门: {0}")]
    InvalidDepartment(String),

    /// 查询参数无效
    #[error("无效的查询: {0}")]
    InvalidQuery(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),
}

impl From<CatalogError> for String {
    fn from(err: CatalogError) -> Self {
        err.to_string()
    }
}

impl serde::Serialize for CatalogError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

// ============================================================================
// 测试
// ============================================================================
