//! # ゲートウェイエラー
//!
//! ゲートウェイが返しうるエラーの分類と、axum レスポンスへの変換。
//!
//! | 種別 | ステータス | 本文の `type` |
//! |------|-----------|--------------|
//! | `OriginDenied` | 403 | `forbidden` |
//! | `CsrfMissing` / `CsrfMismatch` | 403 | `csrf-validation-failed` |
//! | `Unauthenticated` | 401 | `unauthorized` |
//! | `Unauthorized` | 403 | `forbidden` |
//! | `ResourceNotFound` | 404 | `not-found` |
//! | `UpstreamUnavailable` | 502 | `upstream-unavailable` |
//!
//! `OriginDenied` と `Unauthorized` は同じ本文を返し、拒否理由を区別させない。
//! 内部の詳細はログにのみ出力し、レスポンスには含めない。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bastion_infra::InfraError;
use bastion_shared::ErrorResponse;
use thiserror::Error;

/// 拒否時に返す共通の detail
const FORBIDDEN_DETAIL: &str = "このリクエストは許可されていません";

/// ゲートウェイのエラー
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 許可リストにない Origin
    #[error("Origin が許可されていません")]
    OriginDenied,

    /// `X-CSRF-Token` ヘッダーがない
    #[error("CSRF トークンがありません")]
    CsrfMissing,

    /// CSRF トークンが一致しない（サーバー側に値がない場合を含む）
    #[error("CSRF トークンが一致しません")]
    CsrfMismatch,

    /// 有効なセッションまたは資格情報がない
    #[error("認証が必要です")]
    Unauthenticated,

    /// 認可判断が失敗した
    #[error("操作が許可されていません")]
    Unauthorized,

    /// リソースが存在しない
    #[error("リソースが見つかりません")]
    ResourceNotFound,

    /// 上流サービスに到達できない、またはタイムアウトした
    #[error("上流サービスを利用できません: {0}")]
    UpstreamUnavailable(String),

    /// リクエスト本文が上限を超えた
    #[error("リクエスト本文が大きすぎます")]
    PayloadTooLarge,

    /// リクエストの形式が不正
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    /// ログイン時の認証失敗
    #[error("ユーザー名またはパスワードが正しくありません")]
    AuthenticationFailed,

    /// 認証サービスが利用できない
    #[error("認証サービスを利用できません")]
    ServiceUnavailable,

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP ステータスコード
    pub fn status(&self) -> StatusCode {
        match self {
            Self::OriginDenied | Self::CsrfMissing | Self::CsrfMismatch | Self::Unauthorized => {
                StatusCode::FORBIDDEN
            }
            Self::Unauthenticated | Self::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            Self::OriginDenied | Self::Unauthorized => ErrorResponse::forbidden(FORBIDDEN_DETAIL),
            Self::CsrfMissing => ErrorResponse::csrf_validation_failed("CSRF トークンが必要です"),
            Self::CsrfMismatch => ErrorResponse::csrf_validation_failed("CSRF トークンが無効です"),
            Self::Unauthenticated => ErrorResponse::unauthorized("認証が必要です"),
            Self::ResourceNotFound => ErrorResponse::not_found("リソースが見つかりません"),
            Self::UpstreamUnavailable(_) => ErrorResponse::bad_gateway(),
            Self::PayloadTooLarge => {
                ErrorResponse::payload_too_large("リクエスト本文が上限を超えています")
            }
            Self::BadRequest(detail) => ErrorResponse::bad_request(detail.clone()),
            Self::AuthenticationFailed => ErrorResponse::new(
                "authentication-failed",
                "Authentication Failed",
                401,
                "ユーザー名またはパスワードが正しくありません",
            ),
            Self::ServiceUnavailable => {
                ErrorResponse::service_unavailable("認証サービスが一時的に利用できません")
            }
            Self::Internal(_) => ErrorResponse::internal_error(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            Self::UpstreamUnavailable(detail) => {
                tracing::error!(
                    error.category = "external_service",
                    error.kind = "upstream_unavailable",
                    "上流サービスへの転送に失敗: {}",
                    detail
                );
            }
            Self::Internal(detail) => {
                tracing::error!(
                    error.category = "infrastructure",
                    error.kind = "internal",
                    "内部エラー: {}",
                    detail
                );
            }
            Self::ServiceUnavailable => {
                tracing::warn!(
                    error.category = "external_service",
                    error.kind = "auth_service_unavailable",
                    "認証サービスが利用できません"
                );
            }
            _ => {}
        }

        (self.status(), Json(self.body())).into_response()
    }
}

impl From<InfraError> for GatewayError {
    fn from(err: InfraError) -> Self {
        Self::Internal(err.to_string())
    }
}
