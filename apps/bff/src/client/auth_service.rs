//! # Auth Service クライアント
//!
//! ログイン時の資格情報検証を Auth Service に委譲する。
//! ゲートウェイ自身はパスワードを保持・検証しない。
//!
//! ## エンドポイント
//!
//! - `POST /internal/auth/verify` - ユーザー名とパスワードの検証

use std::time::Duration;

use async_trait::async_trait;
use bastion_domain::{
    role::Role,
    user::{UserId, Username},
};
use bastion_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::middleware::request_id::inject_request_id;

/// Auth Service クライアントエラー
#[derive(Debug, Clone, Error)]
pub enum AuthServiceError {
    /// 認証失敗（401）
    #[error("認証に失敗しました")]
    AuthenticationFailed,

    /// Auth Service に到達できない、または 503
    #[error("Auth Service が一時的に利用できません")]
    ServiceUnavailable,

    /// 予期しないエラー
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for AuthServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AuthServiceError::ServiceUnavailable
        } else {
            AuthServiceError::Unexpected(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    user_id:      Uuid,
    username:     String,
    display_name: String,
    #[serde(default)]
    roles:        Vec<String>,
}

/// 検証済みのユーザー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub user_id:      UserId,
    pub username:     Username,
    pub display_name: String,
    pub roles:        Vec<Role>,
}

impl TryFrom<VerifyResponse> for VerifiedUser {
    type Error = AuthServiceError;

    fn try_from(body: VerifyResponse) -> Result<Self, Self::Error> {
        let username = Username::new(body.username)
            .map_err(|e| AuthServiceError::Unexpected(e.to_string()))?;
        Ok(Self {
            user_id: UserId::from_uuid(body.user_id),
            username,
            display_name: body.display_name,
            roles: body.roles.iter().map(Role::new).collect(),
        })
    }
}

/// Auth Service クライアントトレイト
///
/// テスト時にスタブを使用できるようトレイトで定義。
#[async_trait]
pub trait AuthServiceClient: Send + Sync {
    /// ユーザー名とパスワードを検証する
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<VerifiedUser, AuthServiceError>;
}

/// Auth Service クライアント実装
pub struct AuthServiceClientImpl {
    base_url: String,
    client:   reqwest::Client,
}

impl AuthServiceClientImpl {
    /// 新しい AuthServiceClient を作成する
    ///
    /// # 引数
    ///
    /// - `base_url`: Auth Service のベース URL（例: `http://localhost:13002`）
    /// - `timeout`: 1 リクエストあたりのタイムアウト
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client:   reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl AuthServiceClient for AuthServiceClientImpl {
    #[tracing::instrument(skip_all, fields(user.username = %username))]
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<VerifiedUser, AuthServiceError> {
        let url = format!("{}/internal/auth/verify", self.base_url);
        let request = VerifyRequest { username, password };

        let response = inject_request_id(self.client.post(&url).json(&request))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let body = response.json::<ApiResponse<VerifyResponse>>().await?;
                VerifiedUser::try_from(body.data)
            }
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::NOT_FOUND => {
                Err(AuthServiceError::AuthenticationFailed)
            }
            reqwest::StatusCode::SERVICE_UNAVAILABLE => Err(AuthServiceError::ServiceUnavailable),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AuthServiceError::Unexpected(format!(
                    "予期しないステータス {}: {}",
                    status, body
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_検証レスポンスからユーザーを構築できる() {
        let body: ApiResponse<VerifyResponse> = serde_json::from_value(serde_json::json!({
            "data": {
                "user_id": "0190a0b0-0000-7000-8000-000000000001",
                "username": "john",
                "display_name": "John Smith",
                "roles": ["User", "ADMIN"]
            }
        }))
        .unwrap();

        let user = VerifiedUser::try_from(body.data).unwrap();

        assert_eq!(user.username.as_str(), "john");
        assert_eq!(user.display_name, "John Smith");
        assert_eq!(user.roles, vec![Role::user(), Role::admin()]);
    }

    #[test]
    fn test_rolesが省略された場合は空になる() {
        let body: VerifyResponse = serde_json::from_value(serde_json::json!({
            "user_id": "0190a0b0-0000-7000-8000-000000000001",
            "username": "mary",
            "display_name": "Mary"
        }))
        .unwrap();

        let user = VerifiedUser::try_from(body).unwrap();

        assert!(user.roles.is_empty());
    }

    #[test]
    fn test_空のユーザー名は予期しないエラーになる() {
        let body = VerifyResponse {
            user_id:      Uuid::nil(),
            username:     String::new(),
            display_name: "Nobody".to_string(),
            roles:        vec![],
        };

        assert!(matches!(
            VerifiedUser::try_from(body),
            Err(AuthServiceError::Unexpected(_))
        ));
    }
}
