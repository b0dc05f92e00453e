//! # セッション取得ミドルウェア
//!
//! リクエスト受信時に `session_id` Cookie を一度だけ読み、セッション本体・
//! CSRF トークン・資格情報を同一時点のスナップショットとして取得する。
//! 後続の CSRF 検証・ハンドラ・転送はこのスナップショットだけを参照するため、
//! 処理中に並行してログアウトされても判断が食い違わない。

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use bastion_infra::{SessionManager, SessionSnapshot};

use crate::error::GatewayError;

/// セッション Cookie 名
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// リクエスト受信時点のセッション
///
/// Cookie がない場合やセッションが失効している場合は `None` を保持する。
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(Option<SessionSnapshot>);

impl CurrentSession {
    pub fn new(snapshot: Option<SessionSnapshot>) -> Self {
        Self(snapshot)
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.0.as_ref()
    }

    /// 有効なセッションを要求する
    pub fn require(&self) -> Result<&SessionSnapshot, GatewayError> {
        self.0.as_ref().ok_or(GatewayError::Unauthenticated)
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .unwrap_or_default())
    }
}

/// セッション取得ミドルウェア
///
/// セッションストアの障害時はセッションなしとして扱わず、500 を返す。
pub async fn capture_session(
    State(sessions): State<Arc<dyn SessionManager>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let snapshot = match jar.get(SESSION_COOKIE_NAME) {
        Some(cookie) => match sessions.snapshot(cookie.value()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(
                    error.category = "infrastructure",
                    error.kind = "session",
                    "セッション取得で内部エラー: {}",
                    e
                );
                return GatewayError::Internal(e.to_string()).into_response();
            }
        },
        None => None,
    };

    request
        .extensions_mut()
        .insert(CurrentSession::new(snapshot));
    next.run(request).await
}
