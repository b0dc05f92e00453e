//! # ヘルスチェックハンドラ
//!
//! ゲートウェイの稼働状態を確認するためのエンドポイント。
//!
//! - `/health`: Liveness Check（常に `"healthy"` を返す）
//! - `/health/ready`: Readiness Check（セッションストア / 上流 API の接続状態を確認）
//!
//! レスポンス型は [`bastion_shared::HealthResponse`] / [`bastion_shared::ReadinessResponse`] を参照。

use std::{sync::Arc, time::Duration};

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bastion_infra::SessionManager;
use bastion_shared::{CheckStatus, HealthResponse, ReadinessResponse};

/// 個別チェックのタイムアウト
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// ゲートウェイのヘルスチェックエンドポイント
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(env!("CARGO_PKG_VERSION")))
}

/// Readiness Check 用の State
pub struct ReadinessState {
    pub session_manager: Arc<dyn SessionManager>,
    pub upstream_url:    String,
    pub http_client:     reqwest::Client,
}

/// ゲートウェイの Readiness Check エンドポイント
///
/// セッションストアと上流 API の接続状態を並行チェックする。
/// 全チェック OK → 200、1 つでも失敗 → 503。
#[tracing::instrument(skip_all)]
pub async fn readiness_check(State(state): State<Arc<ReadinessState>>) -> impl IntoResponse {
    let (session_store, upstream) = tokio::join!(
        check_session_store(state.session_manager.as_ref()),
        check_upstream(&state.http_client, &state.upstream_url),
    );

    let response =
        ReadinessResponse::from_checks([("session_store", session_store), ("upstream", upstream)]);
    let http_status = if response.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(response))
}

/// セッションストアへの疎通を確認する
async fn check_session_store(sessions: &dyn SessionManager) -> CheckStatus {
    match tokio::time::timeout(CHECK_TIMEOUT, sessions.ping()).await {
        Ok(Ok(())) => CheckStatus::Ok,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "readiness check: session store ping failed");
            CheckStatus::Error
        }
        Err(_) => {
            tracing::warn!("readiness check: session store check timed out");
            CheckStatus::Error
        }
    }
}

/// 上流 API の `/health` を呼び、2xx なら OK とする
async fn check_upstream(client: &reqwest::Client, base_url: &str) -> CheckStatus {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    match tokio::time::timeout(CHECK_TIMEOUT, client.get(&url).send()).await {
        Ok(Ok(response)) if response.status().is_success() => CheckStatus::Ok,
        Ok(Ok(response)) => {
            tracing::warn!(
                upstream.status = response.status().as_u16(),
                "readiness check: upstream is not healthy"
            );
            CheckStatus::Error
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "readiness check: upstream request failed");
            CheckStatus::Error
        }
        Err(_) => {
            tracing::warn!("readiness check: upstream check timed out");
            CheckStatus::Error
        }
    }
}
