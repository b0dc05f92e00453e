//! # 認証ハンドラ
//!
//! ゲートウェイの認証エンドポイントを提供する。
//!
//! ## エンドポイント
//!
//! - `POST /api/v1/auth/login` - ログイン
//! - `POST /api/v1/auth/logout` - ログアウト
//! - `GET /api/v1/auth/me` - 現在のユーザー情報を取得
//! - `GET /api/v1/auth/csrf` - CSRF トークン取得
//!
//! ## Cookie
//!
//! | 名前 | HttpOnly | SameSite | 用途 |
//! |------|----------|----------|------|
//! | `session_id` | ○ | Lax | セッション識別子 |
//! | `csrf_token` | × | Strict | SPA が `X-CSRF-Token` に載せる値 |

mod login;
mod session;

use std::sync::Arc;

use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use bastion_infra::{CredentialVault, SessionManager};
use chrono::{DateTime, Utc};
pub use login::*;
use serde::{Deserialize, Serialize};
pub use session::*;
use uuid::Uuid;

use crate::{client::AuthServiceClient, middleware::SESSION_COOKIE_NAME};

/// CSRF トークン Cookie 名
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// 認証ハンドラの共有状態
pub struct AuthState {
    pub auth_service_client: Arc<dyn AuthServiceClient>,
    pub session_manager:     Arc<dyn SessionManager>,
    pub credential_vault:    CredentialVault,
    pub session_ttl:         chrono::Duration,
    pub cookie_secure:       bool,
}

// --- リクエスト/レスポンス型 ---

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// ログインレスポンスデータ
#[derive(Debug, Serialize)]
pub struct LoginResponseData {
    pub user:       UserResponse,
    pub csrf_token: String,
}

/// ユーザー情報
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id:           Uuid,
    pub username:     String,
    pub display_name: String,
    pub roles:        Vec<String>,
}

/// 現在のユーザー情報データ
#[derive(Debug, Serialize)]
pub struct MeResponseData {
    #[serde(flatten)]
    pub user:               UserResponse,
    pub session_expires_at: DateTime<Utc>,
}

/// CSRF トークンデータ
#[derive(Debug, Serialize)]
pub struct CsrfResponseData {
    pub token: String,
}

// --- Cookie ヘルパー ---

impl AuthState {
    fn cookie_max_age(&self) -> time::Duration {
        time::Duration::seconds(self.session_ttl.num_seconds())
    }

    /// セッション Cookie を構築する
    fn session_cookie(&self, session_id: &str) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, session_id.to_string()))
            .path("/")
            .max_age(self.cookie_max_age())
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .build()
    }

    /// CSRF トークン Cookie を構築する
    ///
    /// SPA が値を読んでヘッダーに載せるため HttpOnly にしない。
    fn csrf_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((CSRF_COOKIE_NAME, token.to_string()))
            .path("/")
            .max_age(self.cookie_max_age())
            .http_only(false)
            .same_site(SameSite::Strict)
            .secure(self.cookie_secure)
            .build()
    }

    /// 両方の Cookie を失効させる
    fn clear_cookies(&self, jar: CookieJar) -> CookieJar {
        let expired = |name: &'static str, http_only: bool, same_site: SameSite| {
            Cookie::build((name, ""))
                .path("/")
                .max_age(time::Duration::seconds(0))
                .http_only(http_only)
                .same_site(same_site)
                .secure(self.cookie_secure)
                .build()
        };
        jar.add(expired(SESSION_COOKIE_NAME, true, SameSite::Lax))
            .add(expired(CSRF_COOKIE_NAME, false, SameSite::Strict))
    }
}

// --- テストユーティリティ ---
