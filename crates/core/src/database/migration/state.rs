//! 迁移步骤与状态机

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 迁移步骤，按执行顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    CreateBackup,
    CreateDepartmentsTable,
    ExtractUniqueDepartments,
    PopulateDepartmentsTable,
    UpdateProductsTable,
    VerifyRefactoring,
}

impl MigrationStep {
    pub const ORDER: [MigrationStep; 6] = [
        MigrationStep::CreateBackup,
        MigrationStep::CreateDepartmentsTable,
        MigrationStep::ExtractUniqueDepartments,
        MigrationStep::PopulateDepartmentsTable,
        MigrationStep::UpdateProductsTable,
        MigrationStep::VerifyRefactoring,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MigrationStep::CreateBackup => "create_backup",
            MigrationStep::CreateDepartmentsTable => "create_departments_table",
            MigrationStep::ExtractUniqueDepartments => "extract_unique_departments",
            MigrationStep::PopulateDepartmentsTable => "populate_departments_table",
            MigrationStep::UpdateProductsTable => "update_products_table",
            MigrationStep::VerifyRefactoring => "verify_refactoring",
        }
    }

    /// 重复执行是否安全
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            MigrationStep::CreateDepartmentsTable
                | MigrationStep::ExtractUniqueDepartments
                | MigrationStep::PopulateDepartmentsTable
                | MigrationStep::VerifyRefactoring
        )
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 迁移状态
///
/// 线性推进：NotStarted → BackedUp → DepartmentsTableReady →
/// DepartmentsPopulated → ProductsTableMigrated → Verified。
/// 任一步骤失败进入 Aborted，之后只能从备份人工恢复。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    NotStarted,
    BackedUp,
    DepartmentsTableReady,
    DepartmentsPopulated,
    ProductsTableMigrated,
    Verified { passed: bool },
    Aborted { step: MigrationStep, reason: String },
}

impl MigrationState {
    /// 步骤成功后进入的状态，None 表示该步骤不改变状态
    pub(crate) fn completed(step: MigrationStep) -> Option<Self> {
        match step {
            MigrationStep::CreateBackup => Some(MigrationState::BackedUp),
            MigrationStep::CreateDepartmentsTable => Some(MigrationState::DepartmentsTableReady),
            MigrationStep::ExtractUniqueDepartments => None,
            MigrationStep::PopulateDepartmentsTable => Some(MigrationState::DepartmentsPopulated),
            MigrationStep::UpdateProductsTable => Some(MigrationState::ProductsTableMigrated),
            // 验证结果由报告决定
            MigrationStep::VerifyRefactoring => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, MigrationState::Aborted { .. })
    }
}

/// 中止句柄
///
/// 可以跨线程克隆。每个步骤开始前以及商品表重建提交前都会检查；
/// 一旦置位，当前步骤以 `MigrationError::Aborted` 失败，重建事务回滚。
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names_follow_order() {
        let names: Vec<_> = MigrationStep::ORDER.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "create_backup",
                "create_departments_table",
                "extract_unique_departments",
                "populate_departments_table",
                "update_products_table",
                "verify_refactoring",
            ]
        );
    }

    #[test]
    fn test_only_backup_and_rebuild_are_not_idempotent() {
        let non_idempotent: Vec<_> = MigrationStep::ORDER
            .iter()
            .filter(|s| !s.is_idempotent())
            .collect();
        assert_eq!(
            non_idempotent,
            vec![&MigrationStep::CreateBackup, &MigrationStep::UpdateProductsTable]
        );
    }

    #[test]
    fn test_state_serialization() {
        let state = MigrationState::Aborted {
            step: MigrationStep::UpdateProductsTable,
            reason: "boom".to_string(),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(
            json,
            r#"{"state":"aborted","step":"update_products_table","reason":"boom"}"#
        );

        let json = serde_json::to_string(&MigrationState::Verified { passed: true }).unwrap();
        assert_eq!(json, r#"{"state":"verified","passed":true}"#);
    }

    #[test]
    fn test_abort_handle_is_shared_between_clones() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_aborted());
        clone.abort();
        assert!(handle.is_aborted());
    }
}
