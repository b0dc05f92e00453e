//! # リクエスト転送
//!
//! 認証済みリクエストを上流 API へ転送し、上流のレスポンスをそのまま中継する。
//!
//! ## 転送時のヘッダー処理
//!
//! - hop-by-hop ヘッダー（`Connection` で列挙されたものを含む）は転送しない
//! - `Host` / `Cookie` / `Authorization` / `X-CSRF-Token` / `Content-Length` は転送しない
//! - `Authorization: Bearer <資格情報>` をゲートウェイが設定する
//! - `X-Request-Id` は task-local の値で付け直す
//!
//! 上流の 401 / 403 を含むステータス、本文、`Content-Type` は書き換えない。
//!
//! 転送先 URL の解決でパスが書き換わらないよう、正規化されていないパスは転送前に 400 で拒否する
//! （[`ensure_canonical_path`]）。
//! クライアントが切断するとハンドラの future ごと破棄され、上流への呼び出しも中断される。

use std::time::Duration;

use axum::{
    body::{Body, HttpBody as _, to_bytes},
    http::{
        HeaderMap,
        HeaderName,
        Request,
        StatusCode,
        Uri,
        header,
    },
    response::Response,
};
use bastion_infra::BackendCredential;
use bastion_shared::observability::REQUEST_ID_HEADER;

use crate::{error::GatewayError, middleware::request_id::inject_request_id};

/// 転送しない hop-by-hop ヘッダー
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// ゲートウェイが管理するため転送しないヘッダー
const GATEWAY_OWNED_HEADERS: &[&str] = &[
    "host",
    "cookie",
    "authorization",
    "x-csrf-token",
    "content-length",
    REQUEST_ID_HEADER,
];

/// 上流 API へのリクエスト転送
#[derive(Debug, Clone)]
pub struct Forwarder {
    client:         reqwest::Client,
    upstream_url:   String,
    strip_prefix:   String,
    max_body_bytes: usize,
}

impl Forwarder {
    /// 新しい Forwarder を作成する
    ///
    /// # 引数
    ///
    /// - `upstream_url`: 転送先のベース URL
    /// - `strip_prefix`: 転送時にパスから取り除くプレフィックス（例: `/api`）
    /// - `timeout`: 上流呼び出しのタイムアウト（接続から本文受信まで）
    /// - `max_body_bytes`: 転送するリクエストボディの上限
    pub fn new(
        upstream_url: &str,
        strip_prefix: &str,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            strip_prefix: strip_prefix.trim_end_matches('/').to_string(),
            max_body_bytes,
        })
    }

    /// 転送先 URL を組み立てる
    ///
    /// プレフィックスはパスセグメント境界で一致した場合のみ取り除く。
    pub fn target_url(&self, uri: &Uri) -> String {
        let path = uri.path();
        let stripped = match path.strip_prefix(self.strip_prefix.as_str()) {
            Some(rest)
                if !self.strip_prefix.is_empty() && (rest.is_empty() || rest.starts_with('/')) =>
            {
                rest
            }
            _ => path,
        };
        let path = if stripped.is_empty() { "/" } else { stripped };

        match uri.query() {
            Some(query) => format!("{}{}?{}", self.upstream_url, path, query),
            None => format!("{}{}", self.upstream_url, path),
        }
    }

    /// リクエストを上流へ転送し、レスポンスを中継する
    ///
    /// # エラー
    ///
    /// - パスが正規化されていない場合は `BadRequest`
    /// - 本文が上限を超える場合は `PayloadTooLarge`
    /// - 接続失敗・タイムアウト・上流本文の読み取り失敗は `UpstreamUnavailable`
    #[tracing::instrument(skip_all, fields(http.method = %request.method(), http.path = %request.uri().path()))]
    pub async fn forward(
        &self,
        request: Request<Body>,
        credential: &BackendCredential,
    ) -> Result<Response, GatewayError> {
        ensure_canonical_path(request.uri().path())?;

        let declared = declared_length(request.headers())
            .unwrap_or(0)
            .max(usize::try_from(request.body().size_hint().lower()).unwrap_or(usize::MAX));
        if declared > self.max_body_bytes {
            return Err(GatewayError::PayloadTooLarge);
        }

        let (parts, body) = request.into_parts();
        let target_url = self.target_url(&parts.uri);
        let headers = forwardable_headers(&parts.headers);

        let body = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(body_read_error)?;

        let mut builder = self
            .client
            .request(parts.method.clone(), &target_url)
            .headers(headers)
            .header(header::AUTHORIZATION, credential.bearer());
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = inject_request_id(builder)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable(e.to_string()))?;

        tracing::debug!(
            upstream.status = response.status().as_u16(),
            "上流からレスポンスを受信しました"
        );

        relay_response(response).await
    }
}

/// パスが正規化済みであることを確認する
///
/// 以下を含むパスは、上流の URL 解決で別のパスに書き換わりうるため拒否する。
///
/// - ドットセグメント（`.` / `..`、`%2e` 表記を含む）
/// - 空セグメント（末尾のスラッシュや `//`）
/// - エンコードされた区切り文字（`%2f` / `%5c`）とバックスラッシュ
///
/// # エラー
///
/// 拒否した場合は `BadRequest`（本文は固定メッセージ）。
pub fn ensure_canonical_path(path: &str) -> Result<(), GatewayError> {
    let lower = path.to_ascii_lowercase();
    let has_encoded_separator =
        lower.contains('\\') || lower.contains("%2f") || lower.contains("%5c");
    let has_irregular_segment = lower
        .strip_prefix('/')
        .unwrap_or(&lower)
        .split('/')
        .any(|segment| matches!(segment.replace("%2e", ".").as_str(), "" | "." | ".."));

    if has_encoded_separator || has_irregular_segment {
        tracing::warn!(http.path = %path, "正規化されていないパスを拒否しました");
        return Err(GatewayError::BadRequest(
            "リクエストパスが正規化されていません".to_string(),
        ));
    }
    Ok(())
}

/// 本文の読み取り失敗をクライアント向けのエラーにする
///
/// 詳細はログにだけ残し、レスポンスには固定メッセージを返す。
fn body_read_error(error: axum::Error) -> GatewayError {
    tracing::warn!(error = %error, "リクエスト本文の読み取りに失敗しました");
    GatewayError::BadRequest("リクエスト本文を読み取れません".to_string())
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// 転送してよいヘッダーだけを残す
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut forwarded = HeaderMap::new();
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower)
            || GATEWAY_OWNED_HEADERS.contains(&lower)
            || connection_listed.contains(name)
        {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// 上流のレスポンスをステータス・本文・Content-Type のまま中継する
async fn relay_response(response: reqwest::Response) -> Result<Response, GatewayError> {
    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| GatewayError::UpstreamUnavailable(e.to_string()))?;
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();

    let body = response
        .bytes()
        .await
        .map_err(|e| GatewayError::UpstreamUnavailable(format!("上流本文の読み取りに失敗: {e}")))?;

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(body))
        .map_err(|e| GatewayError::Internal(format!("レスポンスの構築に失敗: {e}")))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn forwarder() -> Forwarder {
        Forwarder::new("http://upstream:8080/", "/api", Duration::from_secs(1), 1024).unwrap()
    }

    #[rstest]
    #[case("/api/v1/items", "http://upstream:8080/v1/items")]
    #[case("/api/v1/items?page=2&q=a%20b", "http://upstream:8080/v1/items?page=2&q=a%20b")]
    #[case("/api", "http://upstream:8080/")]
    #[case("/apix/v1", "http://upstream:8080/apix/v1")]
    #[case("/other", "http://upstream:8080/other")]
    fn test_転送先urlの組み立て(#[case] uri: &str, #[case] expected: &str) {
        let uri: Uri = uri.parse().unwrap();

        assert_eq!(forwarder().target_url(&uri), expected);
    }

    #[rstest]
    #[case("/api/v1/items")]
    #[case("/api/v1/resources/doc-mary")]
    #[case("/api/v1/files/report.v2.pdf")]
    #[case("/api/v1/files/..hidden")]
    #[case("/api/v1/items/a%20b")]
    fn test_正規化済みのパスは受け付ける(#[case] path: &str) {
        assert!(ensure_canonical_path(path).is_ok());
    }

    #[rstest]
    #[case::カレントセグメント("/api/v1/./resources/doc-mary")]
    #[case::親セグメント("/api/v1/items/../resources/doc-mary")]
    #[case::エンコードされた親セグメント("/api/v1/items/%2e%2e/resources/doc-mary")]
    #[case::大文字でエンコードされたセグメント("/api/v1/%2E/resources/doc-mary")]
    #[case::一部だけエンコードされたセグメント("/api/v1/items/.%2e/resources")]
    #[case::末尾のスラッシュ("/api/v1/resources/doc-mary/")]
    #[case::連続するスラッシュ("/api//v1/resources/doc-mary")]
    #[case::エンコードされたスラッシュ("/api/v1/resources/doc-mary%2fcomments")]
    #[case::エンコードされたバックスラッシュ("/api/v1/resources/doc-mary%5Ccomments")]
    fn test_正規化されていないパスは拒否する(#[case] path: &str) {
        let result = ensure_canonical_path(path);

        assert!(matches!(result, Err(GatewayError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_正規化されていないパスは上流に送らずに拒否する() {
        // Given: 誰も listen していないポート（送信すれば上流エラーになる）
        let forwarder =
            Forwarder::new("http://127.0.0.1:1", "/api", Duration::from_secs(1), 1024).unwrap();
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/./resources/doc-mary")
            .body(Body::empty())
            .unwrap();
        let credential =
            BackendCredential::new("token".to_string(), chrono::Utc::now() + chrono::Duration::minutes(5));

        // When
        let result = forwarder.forward(request, &credential).await;

        // Then
        assert!(matches!(result, Err(GatewayError::BadRequest(_))));
    }

    #[test]
    fn test_本文の読み取り失敗は内部の詳細をクライアントに返さない() {
        let error = axum::Error::new(std::io::Error::other("connection reset by 10.0.0.5"));

        let result = body_read_error(error);

        match result {
            GatewayError::BadRequest(detail) => {
                assert_eq!(detail, "リクエスト本文を読み取れません");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ゲートウェイ管理のヘッダーとhop_by_hopは転送しない() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("bff.local"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session_id=abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer forged"));
        headers.insert("x-csrf-token", HeaderValue::from_static("token"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let forwarded = forwardable_headers(&headers);

        let mut names: Vec<&str> = forwarded.keys().map(HeaderName::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["accept", "content-type"]);
    }

    #[tokio::test]
    async fn test_上流のステータスと本文とcontent_typeをそのまま中継する() {
        let upstream = http::Response::builder()
            .status(403)
            .header("content-type", "application/problem+json")
            .header("set-cookie", "upstream=1")
            .body(r#"{"reason":"upstream says no"}"#.to_string())
            .unwrap();

        let response = relay_response(reqwest::Response::from(upstream)).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"reason":"upstream says no"}"#);
    }

    #[tokio::test]
    async fn test_宣言された長さが上限を超える本文は413() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/items")
            .header(header::CONTENT_LENGTH, "4096")
            .body(Body::from(vec![0_u8; 4096]))
            .unwrap();
        let credential =
            BackendCredential::new("token".to_string(), chrono::Utc::now() + chrono::Duration::minutes(5));

        let result = forwarder().forward(request, &credential).await;

        assert!(matches!(result, Err(GatewayError::PayloadTooLarge)));
    }

    #[tokio::test]
    async fn test_上流に接続できない場合は上流エラー() {
        // Given: 誰も listen していないポート
        let forwarder =
            Forwarder::new("http://127.0.0.1:1", "/api", Duration::from_secs(1), 1024).unwrap();
        let request = Request::builder()
            .uri("/api/v1/items")
            .body(Body::empty())
            .unwrap();
        let credential =
            BackendCredential::new("token".to_string(), chrono::Utc::now() + chrono::Duration::minutes(5));

        // When
        let result = forwarder.forward(request, &credential).await;

        // Then
        assert!(matches!(result, Err(GatewayError::UpstreamUnavailable(_))));
    }
}
