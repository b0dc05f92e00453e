//! # ロール
//!
//! 認証済みユーザーに付与されたロール。ロールの判定は常に Identity 側
//! （セッションに保持されたロール集合）で行う。
//!
//! ## 使用例
//!
//! ```rust
//! use bastion_domain::role::Role;
//!
//! let role = Role::new("Admin");
//! assert_eq!(role, Role::admin());
//! ```

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// ロール名（値オブジェクト）
///
/// 外部の認証サービスから受け取る表記揺れ（`Admin` / `admin`）を吸収するため、
/// 生成時に小文字へ正規化する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(from = "String", into = "String")]
#[display("{_0}")]
pub struct Role(String);

impl Role {
    /// 管理者ロール名
    pub const ADMIN: &'static str = "admin";
    /// 一般ユーザーロール名
    pub const USER: &'static str = "user";

    /// ロールを作成する（小文字に正規化）
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_lowercase())
    }

    /// 管理者ロール
    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    /// 一般ユーザーロール
    pub fn user() -> Self {
        Self::new(Self::USER)
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.0
    }
}
