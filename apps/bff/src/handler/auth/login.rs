//! ログイン・ログアウトハンドラ

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use bastion_infra::SessionData;
use bastion_shared::ApiResponse;

use super::{AuthState, LoginRequest, LoginResponseData, UserResponse};
use crate::{
    client::{AuthServiceError, VerifiedUser},
    error::GatewayError,
    middleware::{CurrentSession, SESSION_COOKIE_NAME},
};

/// POST /api/v1/auth/login
///
/// ユーザー名とパスワードでログインし、セッションを確立する。
///
/// ## フロー
///
/// 1. Auth Service で資格情報を検証
/// 2. 既存のセッション Cookie があれば、そのセッションを破棄（セッション固定化対策）
/// 3. セッションを作成し、バックエンド資格情報と CSRF トークンを紐付ける
/// 4. `session_id` / `csrf_token` Cookie を設定
///
/// 3 の途中で失敗した場合は作成したセッションを破棄する。
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(req) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;

    let user = match state
        .auth_service_client
        .verify_credentials(&req.username, &req.password)
        .await
    {
        Ok(user) => user,
        Err(AuthServiceError::AuthenticationFailed) => {
            tracing::info!(
                event.action = "login_failure",
                user.username = %req.username,
                "ログイン失敗: 資格情報不一致"
            );
            return Err(GatewayError::AuthenticationFailed);
        }
        Err(AuthServiceError::ServiceUnavailable) => return Err(GatewayError::ServiceUnavailable),
        Err(AuthServiceError::Unexpected(detail)) => return Err(GatewayError::Internal(detail)),
    };

    if let Some(previous) = jar.get(SESSION_COOKIE_NAME)
        && let Err(e) = state.session_manager.delete(previous.value()).await
    {
        tracing::warn!("既存セッションの破棄に失敗: {}", e);
    }

    let session_data = SessionData::new(
        user.user_id.clone(),
        user.username.clone(),
        user.display_name.clone(),
        user.roles.clone(),
        state.session_ttl,
    );
    let session_id = state.session_manager.create(&session_data).await?;

    let csrf_token = match establish(&state, &session_id, &session_data).await {
        Ok(token) => token,
        Err(e) => {
            if let Err(cleanup) = state.session_manager.delete(&session_id).await {
                tracing::warn!("作成途中のセッションの破棄に失敗: {}", cleanup);
            }
            return Err(e);
        }
    };

    tracing::info!(
        event.action = "login_success",
        user.username = %user.username,
        "ログイン成功"
    );

    let jar = jar
        .add(state.session_cookie(&session_id))
        .add(state.csrf_cookie(&csrf_token));
    let response = ApiResponse::new(LoginResponseData {
        user: user_response(&user),
        csrf_token,
    });

    Ok((jar, Json(response)))
}

/// 資格情報と CSRF トークンをセッションに紐付ける
async fn establish(
    state: &AuthState,
    session_id: &str,
    session_data: &SessionData,
) -> Result<String, GatewayError> {
    state
        .credential_vault
        .bind(session_id, session_data)
        .await?;
    Ok(state.session_manager.create_csrf_token(session_id).await?)
}

fn user_response(user: &VerifiedUser) -> UserResponse {
    UserResponse {
        id:           *user.user_id.as_uuid(),
        username:     user.username.to_string(),
        display_name: user.display_name.clone(),
        roles:        user.roles.iter().map(ToString::to_string).collect(),
    }
}

/// POST /api/v1/auth/logout
///
/// セッションを破棄してログアウトする。
/// セッションに紐づく CSRF トークンと資格情報も同時に失効する。
///
/// CSRF 検証を通過したリクエストだけが届くため、有効なセッションのスナップショットを持つ。
#[tracing::instrument(skip_all)]
pub async fn logout(
    State(state): State<Arc<AuthState>>,
    session: CurrentSession,
    jar: CookieJar,
) -> Result<impl IntoResponse, GatewayError> {
    if let Some(snapshot) = session.snapshot() {
        state.session_manager.delete(snapshot.session_id()).await?;
        tracing::info!(
            event.action = "logout",
            user.username = %snapshot.data().username(),
            "ログアウト"
        );
    }

    Ok((state.clear_cookies(jar), StatusCode::NO_CONTENT))
}
