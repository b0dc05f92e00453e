//! セッション参照ハンドラ（me, csrf）

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use axum_extra::extract::CookieJar;
use bastion_shared::ApiResponse;

use super::{AuthState, CsrfResponseData, MeResponseData, UserResponse};
use crate::{error::GatewayError, middleware::CurrentSession};

/// GET /api/v1/auth/me
///
/// リクエスト受信時のセッションから現在のユーザー情報を返す。
#[tracing::instrument(skip_all)]
pub async fn me(session: CurrentSession) -> Result<impl IntoResponse, GatewayError> {
    let data = session.require()?.data();

    Ok(Json(ApiResponse::new(MeResponseData {
        user:               UserResponse {
            id:           *data.user_id().as_uuid(),
            username:     data.username().to_string(),
            display_name: data.display_name().to_string(),
            roles:        data.roles().iter().map(ToString::to_string).collect(),
        },
        session_expires_at: data.expires_at(),
    })))
}

/// GET /api/v1/auth/csrf
///
/// CSRF トークンを取得する。発行済みであればそれを返し、未発行なら新規に発行する。
/// セッションがない場合は 401。
#[tracing::instrument(skip_all)]
pub async fn csrf(
    State(state): State<Arc<AuthState>>,
    session: CurrentSession,
    jar: CookieJar,
) -> Result<impl IntoResponse, GatewayError> {
    let snapshot = session.require()?;

    let token = match snapshot.csrf_token() {
        Some(token) => token.to_string(),
        None => state
            .session_manager
            .create_csrf_token(snapshot.session_id())
            .await
            .map_err(|e| {
                if e.is_session_not_found() {
                    GatewayError::Unauthenticated
                } else {
                    GatewayError::from(e)
                }
            })?,
    };

    let jar = jar.add(state.csrf_cookie(&token));
    Ok((jar, Json(ApiResponse::new(CsrfResponseData { token }))))
}
