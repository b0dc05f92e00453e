//! # キャッシュ制御ミドルウェア
//!
//! セッションに依存するレスポンスが共有キャッシュやブラウザに残らないよう、
//! 全レスポンスの `Cache-Control` を `no-store` に上書きする。
//! 上流から中継したレスポンスも対象に含む。

use axum::{
    extract::Request,
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

/// レスポンスに `Cache-Control: no-store` を付与する
pub async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
