//! # Origin 検証ミドルウェア
//!
//! 許可リストにない `Origin` からのリクエストを、セッション・CSRF・資格情報の
//! 処理より前に拒否する。`Origin` ヘッダーのないリクエスト（同一オリジンの GET や
//! ブラウザ以外のクライアント）はそのまま通す。
//!
//! 許可されたオリジンへの CORS レスポンスヘッダーは [`cors_layer`] が付与する。

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bastion_shared::observability::REQUEST_ID_HEADER;
use tower_http::cors::{AllowOrigin, CorsLayer};

use super::csrf::CSRF_HEADER;
use crate::{error::GatewayError, origin::OriginAllowlist};

/// プリフライト結果のキャッシュ期間
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(600);

/// Origin 検証ミドルウェア
pub async fn origin_guard(
    State(allowlist): State<Arc<OriginAllowlist>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let allowed = origin.to_str().is_ok_and(|o| allowlist.is_allowed(o));
        if !allowed {
            tracing::warn!(
                http.origin = ?origin,
                http.path = %request.uri().path(),
                "許可されていない Origin からのリクエストを拒否しました"
            );
            return GatewayError::OriginDenied.into_response();
        }
    }

    next.run(request).await
}

/// 許可リストに基づく CORS レイヤー
///
/// Cookie を伴うリクエストを許可するため `allow_credentials(true)` とし、
/// メソッドとヘッダーはワイルドカードを使わず列挙する。
pub fn cors_layer(allowlist: Arc<OriginAllowlist>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().is_ok_and(|o| allowlist.is_allowed(o))
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(CSRF_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(PREFLIGHT_MAX_AGE)
}
