//! # 所有者付きリソースの操作ハンドラ
//!
//! 変更系の操作は、上流からリソースをロードして認可判断を行ってから実行する。
//!
//! ```text
//! 資格情報取得 → ロード → authorize(owner-or-admin) → 削除 / 更新 / 転送
//! ```
//!
//! ロードで見つからない場合は認可を評価せずに 404 を返す。
//! `/api/v1/resources/{id}` とその配下への GET / HEAD は認可判断を上流に委ね、そのまま転送する。
//! それ以外のメソッド（PATCH やサブリソースへの POST など）は、転送前に同じ認可判断を通す。

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use bastion_domain::{authorization::AuthorizationEngine, policy::OWNER_OR_ADMIN};
use bastion_infra::{BackendCredential, SessionSnapshot};
use bastion_shared::ApiResponse;
use serde::Deserialize;

use super::proxy::ProxyState;
use crate::{
    client::{ResourceApiClient, ResourceRecord, ensure_canonical_path},
    error::GatewayError,
    middleware::CurrentSession,
};

/// リソースハンドラの共有状態
pub struct ResourceState {
    pub resource_client:          Arc<dyn ResourceApiClient>,
    pub authorization:            AuthorizationEngine,
    pub proxy:                    Arc<ProxyState>,
    pub hide_forbidden_resources: bool,
}

impl ResourceState {
    /// セッションと資格情報を要求する
    async fn authenticated<'a>(
        &self,
        session: &'a CurrentSession,
    ) -> Result<(&'a SessionSnapshot, BackendCredential), GatewayError> {
        let snapshot = session.require()?;
        let credential = self.proxy.credential_for(snapshot).await?;
        Ok((snapshot, credential))
    }

    /// ロード済みリソースに対して `owner-or-admin` を評価する
    ///
    /// 拒否時のステータスは `hide_forbidden_resources` に従う。
    fn authorize(
        &self,
        snapshot: &SessionSnapshot,
        resource: &ResourceRecord,
    ) -> Result<(), GatewayError> {
        let identity = snapshot.data().identity();
        let decision = self
            .authorization
            .authorize(&identity, resource, OWNER_OR_ADMIN)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        if decision.is_succeeded() {
            return Ok(());
        }

        tracing::warn!(
            user.username = %identity.username(),
            resource.id = %resource.id,
            resource.owner = %resource.owner,
            policy = OWNER_OR_ADMIN,
            "リソースへの操作を拒否しました"
        );
        Err(if self.hide_forbidden_resources {
            GatewayError::ResourceNotFound
        } else {
            GatewayError::Unauthorized
        })
    }
}

/// `{id}` を含むリソースルートのパスパラメータ
///
/// サブリソースのルートでは残りのパスも渡されるが、`id` だけを取り出す。
#[derive(Debug, Deserialize)]
pub struct ResourcePath {
    id: String,
}

/// DELETE /api/v1/resources/{id}
#[tracing::instrument(skip_all, fields(resource.id = %id))]
pub async fn delete_resource(
    State(state): State<Arc<ResourceState>>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    let (snapshot, credential) = state.authenticated(&session).await?;

    let resource = state.resource_client.load(&id, &credential).await?;
    state.authorize(snapshot, &resource)?;
    state.resource_client.delete(&id, &credential).await?;

    tracing::info!(
        event.action = "resource_deleted",
        user.username = %snapshot.data().username(),
        "リソースを削除しました"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/resources/{id}
#[tracing::instrument(skip_all, fields(resource.id = %id))]
pub async fn update_resource(
    State(state): State<Arc<ResourceState>>,
    session: CurrentSession,
    Path(id): Path<String>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let (snapshot, credential) = state.authenticated(&session).await?;
    let Json(body) = payload.map_err(|e| GatewayError::BadRequest(e.body_text()))?;

    let resource = state.resource_client.load(&id, &credential).await?;
    state.authorize(snapshot, &resource)?;
    let updated = state.resource_client.update(&id, &body, &credential).await?;

    Ok(Json(ApiResponse::new(updated)))
}

/// `/api/v1/resources/{id}` の DELETE / PUT 以外と、`/api/v1/resources/{id}/*` の全メソッド
///
/// GET / HEAD 以外は、リソースをロードして認可判断を通してから上流へ転送する。
#[tracing::instrument(skip_all, fields(http.method = %request.method(), resource.id = %id))]
pub async fn forward_resource(
    State(state): State<Arc<ResourceState>>,
    session: CurrentSession,
    Path(ResourcePath { id }): Path<ResourcePath>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    ensure_canonical_path(request.uri().path())?;
    let (snapshot, credential) = state.authenticated(&session).await?;

    if !is_read_only(request.method()) {
        let resource = state.resource_client.load(&id, &credential).await?;
        state.authorize(snapshot, &resource)?;
    }

    state.proxy.forwarder.forward(request, &credential).await
}

fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}
