//! # 上流転送ハンドラ
//!
//! 個別のルートを持たない `/api/` 配下のリクエストを、セッションに紐づく
//! 資格情報を付けて上流へ転送する。`/api/` 以外のパスは 404。

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, response::Response};
use bastion_infra::{BackendCredential, CredentialVault, SessionSnapshot};

use crate::{client::Forwarder, error::GatewayError, middleware::CurrentSession};

/// 転送対象のパスプレフィックス
const PROXIED_PREFIX: &str = "/api/";

/// 転送ハンドラの共有状態
pub struct ProxyState {
    pub forwarder:        Forwarder,
    pub credential_vault: CredentialVault,
}

impl ProxyState {
    /// スナップショットのセッションに紐づく資格情報を取得する
    ///
    /// 資格情報が期限切れでもセッションが有効なら再発行される。
    /// セッションが既に削除されている場合は `Unauthenticated`。
    pub(crate) async fn credential_for(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<BackendCredential, GatewayError> {
        self.credential_vault
            .lookup_in(snapshot)
            .await?
            .ok_or(GatewayError::Unauthenticated)
    }
}

/// ルーターのフォールバック
pub async fn proxy(
    State(state): State<Arc<ProxyState>>,
    session: CurrentSession,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    if !request.uri().path().starts_with(PROXIED_PREFIX) {
        return Err(GatewayError::ResourceNotFound);
    }

    let snapshot = session.require()?;
    let credential = state.credential_for(snapshot).await?;

    state.forwarder.forward(request, &credential).await
}
