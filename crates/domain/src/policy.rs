//! # ポリシーレジストリ
//!
//! ポリシー名から (要件, ハンドラ) の順序付きリストを解決する。
//!
//! レジストリはプロセス起動時に [`PolicyRegistryBuilder`] で一度だけ構築し、
//! 以降は不変の値として `Arc` 経由で共有する。
//! ルートが参照するポリシー名は [`PolicyRegistryBuilder::build`] に渡して検証し、
//! 未登録のポリシーがあれば起動を中止する。
//! [`PolicyRegistryBuilder::register`] は必ずハンドラを 1 つ追加するため、
//! 登録済みのポリシー名は常に 1 つ以上のハンドラを持つ。

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    DomainError,
    authorization::{AuthorizationHandler, OwnerHandler, Requirement, RoleHandler},
    role::Role,
};

/// 「所有者または管理者」ポリシー名
pub const OWNER_OR_ADMIN: &str = "owner-or-admin";

/// ポリシーを構成する 1 エントリ
#[derive(Clone)]
pub struct PolicyEntry {
    requirement: Requirement,
    handler:     Arc<dyn AuthorizationHandler>,
}

impl PolicyEntry {
    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    pub fn handler(&self) -> &dyn AuthorizationHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for PolicyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEntry")
            .field("requirement", &self.requirement)
            .finish_non_exhaustive()
    }
}

/// ポリシーレジストリのビルダー
#[derive(Default)]
pub struct PolicyRegistryBuilder {
    policies: HashMap<String, Vec<PolicyEntry>>,
}

impl PolicyRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// ポリシーにハンドラを追加する
    ///
    /// 同じポリシー名で複数回呼ぶと、呼び出し順に評価される。
    pub fn register(
        &mut self,
        policy: impl Into<String>,
        requirement: Requirement,
        handler: Arc<dyn AuthorizationHandler>,
    ) -> &mut Self {
        self.policies
            .entry(policy.into())
            .or_default()
            .push(PolicyEntry {
                requirement,
                handler,
            });
        self
    }

    /// 組み込みポリシーを登録済みのビルダー
    ///
    /// | ポリシー | チェーン |
    /// |---------|---------|
    /// | `owner-or-admin` | `RoleHandler(admin)` → `OwnerHandler` |
    pub fn with_defaults() -> Self {
        let mut builder = Self::new();
        builder
            .register(
                OWNER_OR_ADMIN,
                Requirement::OWNER_OR_ADMIN,
                Arc::new(RoleHandler::new(Role::admin())),
            )
            .register(
                OWNER_OR_ADMIN,
                Requirement::OWNER_OR_ADMIN,
                Arc::new(OwnerHandler),
            );
        builder
    }

    /// レジストリを構築する
    ///
    /// `required` にはルートが参照する全てのポリシー名を渡す。
    ///
    /// # エラー
    ///
    /// `required` に未登録のポリシーが含まれる場合は `DomainError::UnknownPolicy`。
    pub fn build(self, required: &[&str]) -> Result<PolicyRegistry, DomainError> {
        if let Some(missing) = required.iter().find(|name| !self.policies.contains_key(**name)) {
            return Err(DomainError::UnknownPolicy((*missing).to_string()));
        }

        Ok(PolicyRegistry {
            policies: self.policies,
        })
    }
}

/// 構築済みのポリシーレジストリ（不変）
#[derive(Debug)]
pub struct PolicyRegistry {
    policies: HashMap<String, Vec<PolicyEntry>>,
}

impl PolicyRegistry {
    /// 組み込みポリシーのみを持つレジストリ
    pub fn with_defaults() -> Self {
        Self {
            policies: PolicyRegistryBuilder::with_defaults().policies,
        }
    }

    /// ポリシー名からハンドラチェーンを解決する
    pub fn resolve(&self, name: &str) -> Result<&[PolicyEntry], DomainError> {
        self.policies
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| DomainError::UnknownPolicy(name.to_string()))
    }

    /// 登録済みのポリシー名（ソート済み）
    pub fn policy_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
