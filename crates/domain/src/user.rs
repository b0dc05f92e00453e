//! # ユーザー識別子
//!
//! ## 識別子の種類
//!
//! | 型 | 用途 |
//! |---|------|
//! | [`UserId`] | 内部的な一意識別子。バックエンド認証情報の `uid` クレームに載せる |
//! | [`Username`] | サブジェクトキー。リソースの `owner` 属性と比較される唯一の識別子 |
//!
//! 表示名は単なる `String` として扱い、所有者比較には使えない。

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

/// ユーザー ID（一意識別子）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct UserId(Uuid);

impl UserId {
    /// 新しいユーザー ID を生成する
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// 既存の UUID からユーザー ID を作成する
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 内部の UUID 参照を取得する
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

/// ユーザー名（値オブジェクト）
///
/// リソースの所有者属性と完全一致で比較されるサブジェクトキー。
/// 大文字小文字は区別する。
///
/// # バリデーション
///
/// - 前後の空白を除いて空文字列ではない
/// - 最大 255 文字
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct Username(String);

impl Username {
    /// ユーザー名を作成する
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(DomainError::Validation(
                "ユーザー名は必須です".to_string(),
            ));
        }
        if trimmed.chars().count() > 255 {
            return Err(DomainError::Validation(
                "ユーザー名は 255 文字以内である必要があります".to_string(),
            ));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}
