//! # Request ID の上流伝播
//!
//! `SetRequestIdLayer` が決めた Request ID を task-local に置き、
//! 上流（Auth Service・リソース API・転送先）への呼び出しに `X-Request-Id` として付け直す。
//!
//! 転送時はクライアントの `X-Request-Id` ヘッダーを一度取り除くため、
//! 上流に届くのは常にこのスコープの値になる。

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use bastion_shared::observability::REQUEST_ID_HEADER;
use tower_http::request_id::RequestId;

tokio::task_local! {
    static REQUEST_ID: HeaderValue;
}

/// 現在のリクエストの Request ID（スコープ外では `None`）
pub fn current_request_id() -> Option<HeaderValue> {
    REQUEST_ID.try_with(HeaderValue::clone).ok()
}

/// Request ID を task-local に保存するミドルウェア
///
/// `RequestId` 拡張がない場合はスコープを作らずに次へ進む。
pub async fn store_request_id(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.header_value().clone());

    match request_id {
        Some(id) => REQUEST_ID.scope(id, next.run(request)).await,
        None => next.run(request).await,
    }
}

/// 上流への呼び出しに `X-Request-Id` を付与する
pub fn inject_request_id(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match current_request_id() {
        Some(id) => builder.header(REQUEST_ID_HEADER, id),
        None => builder,
    }
}
