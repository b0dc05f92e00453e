//! # リソースベース認可エンジン
//!
//! ロード済みのリソースに対して、所有者またはロールに基づくポリシーを評価する。
//!
//! ## 評価規則
//!
//! ポリシーは (要件, ハンドラ) の順序付きリストであり、登録順に評価する。
//!
//! | ハンドラの結果 | 動作 |
//! |---------------|------|
//! | `Succeed` | 直ちに `Decision::Succeeded`（以降のハンドラは評価しない） |
//! | `Fail` | 直ちに `Decision::Failed`（明示的な拒否） |
//! | `Abstain` | 次のハンドラへ |
//!
//! 全ハンドラが `Abstain` の場合は `Decision::Failed`。
//! 「全ハンドラの合意が必要」なモードは存在しない。
//!
//! ## 呼び出し順序
//!
//! [`AuthorizationEngine::authorize`] は `&dyn OwnedResource` を要求するため、
//! リソースをロードする前に呼び出すことはできない。
//! 「ロード → 認可 → 変更」の順序は型で強制される。

use std::{fmt, sync::Arc};

use derive_more::Display;

use crate::{
    DomainError,
    identity::Identity,
    policy::PolicyRegistry,
    resource::OwnedResource,
    role::Role,
};

/// 認可要件
///
/// 状態を持たない名前付きマーカー。ポリシーレジストリ内でのディスパッチキーとしてのみ使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{_0}")]
pub struct Requirement(&'static str);

impl Requirement {
    /// 所有者または管理者
    pub const OWNER_OR_ADMIN: Requirement = Requirement("owner-or-admin");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

/// ハンドラの評価結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 要件を満たした
    Succeed,
    /// 明示的に拒否した
    Fail,
    /// 判断しない（次のハンドラに委ねる）
    Abstain,
}

/// 認可ハンドラ
///
/// 新しいリソース種別や判定規則はこのトレイトを実装し、
/// [`PolicyRegistryBuilder::register`](crate::policy::PolicyRegistryBuilder::register)
/// で登録する。
pub trait AuthorizationHandler: Send + Sync {
    fn handle(
        &self,
        identity: &Identity,
        resource: &dyn OwnedResource,
        requirement: Requirement,
    ) -> HandlerOutcome;
}

/// ロール保持者を許可するハンドラ
#[derive(Debug, Clone)]
pub struct RoleHandler {
    role: Role,
}

impl RoleHandler {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl AuthorizationHandler for RoleHandler {
    fn handle(
        &self,
        identity: &Identity,
        _resource: &dyn OwnedResource,
        _requirement: Requirement,
    ) -> HandlerOutcome {
        if identity.has_role(&self.role) {
            HandlerOutcome::Succeed
        } else {
            HandlerOutcome::Abstain
        }
    }
}

/// リソースの所有者を許可するハンドラ
///
/// `Identity::username` と `OwnedResource::owner` を完全一致で比較する。
/// 両者とも [`Username`](crate::user::Username) 型であり、表示名や数値 ID と比較されることはない。
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerHandler;

impl AuthorizationHandler for OwnerHandler {
    fn handle(
        &self,
        identity: &Identity,
        resource: &dyn OwnedResource,
        _requirement: Requirement,
    ) -> HandlerOutcome {
        if identity.username() == resource.owner() {
            HandlerOutcome::Succeed
        } else {
            HandlerOutcome::Abstain
        }
    }
}

/// 認可判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Succeeded,
    Failed,
}

impl Decision {
    pub fn is_succeeded(self) -> bool {
        matches!(self, Decision::Succeeded)
    }
}

/// リソースベース認可エンジン
///
/// 副作用を持たない。リソースの削除・更新は判断を受け取った呼び出し側が行う。
#[derive(Clone)]
pub struct AuthorizationEngine {
    registry: Arc<PolicyRegistry>,
}

impl AuthorizationEngine {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    /// ロード済みリソースに対してポリシーを評価する
    ///
    /// # エラー
    ///
    /// 未登録のポリシー名の場合は `DomainError::UnknownPolicy`。
    /// 起動時検証を通過していれば発生しない。
    pub fn authorize(
        &self,
        identity: &Identity,
        resource: &dyn OwnedResource,
        policy_name: &str,
    ) -> Result<Decision, DomainError> {
        let chain = self.registry.resolve(policy_name)?;

        for entry in chain {
            match entry.handler().handle(identity, resource, entry.requirement()) {
                HandlerOutcome::Succeed => {
                    tracing::debug!(
                        policy = policy_name,
                        requirement = %entry.requirement(),
                        resource_id = resource.resource_id(),
                        "認可成功"
                    );
                    return Ok(Decision::Succeeded);
                }
                HandlerOutcome::Fail => {
                    tracing::debug!(
                        policy = policy_name,
                        requirement = %entry.requirement(),
                        resource_id = resource.resource_id(),
                        "ハンドラが明示的に拒否"
                    );
                    return Ok(Decision::Failed);
                }
                HandlerOutcome::Abstain => {}
            }
        }

        tracing::debug!(
            policy = policy_name,
            resource_id = resource.resource_id(),
            "成功したハンドラなし"
        );
        Ok(Decision::Failed)
    }
}

impl fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("policies", &self.registry.policy_names())
            .finish()
    }
}
