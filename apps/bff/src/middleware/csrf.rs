//! # CSRF 検証ミドルウェア
//!
//! 状態変更リクエスト（POST/PUT/PATCH/DELETE）で CSRF トークンを検証する。
//!
//! ## トークンのライフサイクル
//!
//! ```text
//! NoToken ──(ログイン / GET /api/v1/auth/csrf)──▶ TokenIssued
//! TokenIssued ──(一致するヘッダー)──▶ TokenValidated（何度でも）
//! TokenIssued / TokenValidated ──(ログアウト・セッション削除)──▶ Revoked
//! ```
//!
//! 期待値はリクエスト受信時のセッションスナップショットから取り、
//! 提示値は `X-CSRF-Token` ヘッダーからのみ読む（Cookie・クエリ・本文は見ない）。

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use super::session::CurrentSession;
use crate::error::GatewayError;

/// CSRF 検証用のヘッダー名
pub const CSRF_HEADER: &str = "x-csrf-token";

/// 検証対象から除外するパス（セッション確立前に呼ばれるもの）
const DEFAULT_EXEMPT_PATHS: &[&str] = &["/api/v1/auth/login"];

/// CSRF 検証の設定
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    protected_prefixes: Vec<String>,
    exempt_paths:       Vec<String>,
}

impl CsrfConfig {
    pub fn new(protected_prefixes: Vec<String>) -> Self {
        Self {
            protected_prefixes,
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(ToString::to_string).collect(),
        }
    }

    /// CSRF 検証が必要なリクエストかどうか
    pub fn requires_validation(&self, method: &Method, path: &str) -> bool {
        matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        ) && self
            .protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
            && !self.exempt_paths.iter().any(|exempt| exempt == path)
    }
}

/// 提示されたトークンとサーバー側の値を照合する
///
/// - ヘッダーがない（空を含む）場合は `CsrfMissing`
/// - サーバー側に値がない、または一致しない場合は `CsrfMismatch`
///
/// 比較は定数時間で行う。
pub fn validate_csrf(provided: Option<&str>, expected: Option<&str>) -> Result<(), GatewayError> {
    let provided = provided
        .filter(|token| !token.is_empty())
        .ok_or(GatewayError::CsrfMissing)?;
    let expected = expected.ok_or(GatewayError::CsrfMismatch)?;

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(GatewayError::CsrfMismatch)
    }
}

/// CSRF 検証ミドルウェア
///
/// `capture_session` の内側に配置する。検証に失敗した場合、後続の処理は一切呼ばれない。
pub async fn csrf_guard(
    State(config): State<Arc<CsrfConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !config.requires_validation(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());
    let expected = request
        .extensions()
        .get::<CurrentSession>()
        .and_then(CurrentSession::snapshot)
        .and_then(|snapshot| snapshot.csrf_token());

    if let Err(e) = validate_csrf(provided, expected) {
        tracing::warn!(
            http.method = %request.method(),
            http.path = %request.uri().path(),
            "CSRF 検証に失敗しました: {}",
            e
        );
        return e.into_response();
    }

    next.run(request).await
}
