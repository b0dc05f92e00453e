//! # リソース API クライアント
//!
//! 所有者属性を持つリソースを上流のリソースストアから取得・変更する。
//! ゲートウェイはリソースを保持せず、認可判断のために都度ロードする。
//!
//! ## エンドポイント
//!
//! - `GET /v1/resources/{id}` - リソース取得
//! - `PUT /v1/resources/{id}` - リソース更新
//! - `DELETE /v1/resources/{id}` - リソース削除
//!
//! いずれもゲートウェイが発行した資格情報を `Authorization: Bearer` で送る。

use std::time::Duration;

use async_trait::async_trait;
use bastion_domain::{resource::OwnedResource, user::Username};
use bastion_infra::BackendCredential;
use bastion_shared::ApiResponse;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use url::Url;

use crate::{error::GatewayError, middleware::request_id::inject_request_id};

/// リソース API クライアントエラー
#[derive(Debug, Clone, Error)]
pub enum ResourceApiError {
    /// リソースが存在しない（404）
    #[error("リソースが見つかりません")]
    NotFound,

    /// 上流が資格情報を受け付けなかった（401）
    #[error("資格情報が拒否されました")]
    Unauthenticated,

    /// 上流が操作を拒否した（403）
    #[error("操作が拒否されました")]
    Forbidden,

    /// 上流に到達できない、またはタイムアウトした
    #[error("リソースストアを利用できません: {0}")]
    Unavailable(String),

    /// 予期しないエラー
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for ResourceApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ResourceApiError::Unavailable(err.to_string())
        } else {
            ResourceApiError::Unexpected(err.to_string())
        }
    }
}

impl From<ResourceApiError> for GatewayError {
    fn from(err: ResourceApiError) -> Self {
        match err {
            ResourceApiError::NotFound => GatewayError::ResourceNotFound,
            ResourceApiError::Unauthenticated => GatewayError::Unauthenticated,
            ResourceApiError::Forbidden => GatewayError::Unauthorized,
            ResourceApiError::Unavailable(detail) => GatewayError::UpstreamUnavailable(detail),
            ResourceApiError::Unexpected(detail) => GatewayError::Internal(detail),
        }
    }
}

/// 上流からロードしたリソース
///
/// `id` と `owner` 以外の属性は解釈せずに保持する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id:         String,
    pub owner:      Username,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl OwnedResource for ResourceRecord {
    fn resource_id(&self) -> &str {
        &self.id
    }

    fn owner(&self) -> &Username {
        &self.owner
    }
}

/// リソース API クライアントトレイト
///
/// テスト時にスタブを使用できるようトレイトで定義。
#[async_trait]
pub trait ResourceApiClient: Send + Sync {
    /// リソースをロードする
    async fn load(
        &self,
        id: &str,
        credential: &BackendCredential,
    ) -> Result<ResourceRecord, ResourceApiError>;

    /// リソースを削除する
    async fn delete(&self, id: &str, credential: &BackendCredential)
    -> Result<(), ResourceApiError>;

    /// リソースを更新する
    async fn update(
        &self,
        id: &str,
        body: &serde_json::Value,
        credential: &BackendCredential,
    ) -> Result<ResourceRecord, ResourceApiError>;
}

/// リソース API クライアント実装
#[derive(Clone)]
pub struct ResourceApiClientImpl {
    base_url: Url,
    client:   reqwest::Client,
}

impl ResourceApiClientImpl {
    /// 新しい ResourceApiClient を作成する
    ///
    /// # 引数
    ///
    /// - `base_url`: 上流 API のベース URL（例: `http://localhost:13001`）
    /// - `timeout`: 1 リクエストあたりのタイムアウト
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ResourceApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ResourceApiError::Unexpected(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ResourceApiError::Unexpected(format!(
                "ベース URL として使用できません: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// リソース ID をパスセグメントとしてエスケープした URL
    ///
    /// `.` と `..` はパスの正規化で別のリソースを指してしまうため存在しない扱いにする。
    fn resource_url(&self, id: &str) -> Result<Url, ResourceApiError> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(ResourceApiError::NotFound);
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ResourceApiError::Unexpected(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v1", "resources", id]);
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        id: &str,
        credential: &BackendCredential,
    ) -> Result<reqwest::RequestBuilder, ResourceApiError> {
        Ok(inject_request_id(
            self.client
                .request(method, self.resource_url(id)?)
                .header(AUTHORIZATION, credential.bearer()),
        ))
    }
}

#[async_trait]
impl ResourceApiClient for ResourceApiClientImpl {
    #[tracing::instrument(skip_all, fields(resource.id = %id))]
    async fn load(
        &self,
        id: &str,
        credential: &BackendCredential,
    ) -> Result<ResourceRecord, ResourceApiError> {
        let response = self
            .request(reqwest::Method::GET, id, credential)?
            .send()
            .await?;
        handle_response::<ResourceRecord>(response)
            .await
            .map(|body| body.data)
    }

    #[tracing::instrument(skip_all, fields(resource.id = %id))]
    async fn delete(
        &self,
        id: &str,
        credential: &BackendCredential,
    ) -> Result<(), ResourceApiError> {
        let response = self
            .request(reqwest::Method::DELETE, id, credential)?
            .send()
            .await?;
        ensure_success(response).await
    }

    #[tracing::instrument(skip_all, fields(resource.id = %id))]
    async fn update(
        &self,
        id: &str,
        body: &serde_json::Value,
        credential: &BackendCredential,
    ) -> Result<ResourceRecord, ResourceApiError> {
        let response = self
            .request(reqwest::Method::PUT, id, credential)?
            .json(body)
            .send()
            .await?;
        handle_response::<ResourceRecord>(response)
            .await
            .map(|body| body.data)
    }
}

/// 上流レスポンスの共通ハンドリング
///
/// 成功時はレスポンスボディを `ApiResponse<T>` にデシリアライズし、
/// エラー時はステータスコードに応じた `ResourceApiError` を返す。
async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<ApiResponse<T>, ResourceApiError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| ResourceApiError::Unexpected(e.to_string()));
    }

    Err(status_error(response).await)
}

async fn ensure_success(response: reqwest::Response) -> Result<(), ResourceApiError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(status_error(response).await)
}

async fn status_error(response: reqwest::Response) -> ResourceApiError {
    let status = response.status();
    match status {
        reqwest::StatusCode::NOT_FOUND => ResourceApiError::NotFound,
        reqwest::StatusCode::UNAUTHORIZED => ResourceApiError::Unauthenticated,
        reqwest::StatusCode::FORBIDDEN => ResourceApiError::Forbidden,
        reqwest::StatusCode::BAD_GATEWAY
        | reqwest::StatusCode::SERVICE_UNAVAILABLE
        | reqwest::StatusCode::GATEWAY_TIMEOUT => {
            ResourceApiError::Unavailable(format!("上流ステータス {}", status))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            ResourceApiError::Unexpected(format!("予期しないステータス {}: {}", status, body))
        }
    }
}
