//! # Identity（認証済みの主体）
//!
//! セッションから復元される「誰がリクエストしているか」の表現。
//! リクエスト受信時に一度だけ構築され、認可判断に渡される。

use crate::{
    role::Role,
    user::{UserId, Username},
};

/// 認証済みの主体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id:      UserId,
    username:     Username,
    display_name: String,
    roles:        Vec<Role>,
}

impl Identity {
    pub fn new(user_id: UserId, username: Username, display_name: String, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            username,
            display_name,
            roles,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// 所有者比較に使うサブジェクトキー
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// 表示専用。認可判断には使わない
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// 指定ロールを保持しているか
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
