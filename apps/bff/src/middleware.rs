//! # ミドルウェア
//!
//! リクエストが到達する順に、Origin 検証 → セッション取得 → CSRF 検証を行う。

mod cache_control;
mod csrf;
mod origin;
pub mod request_id;
mod session;

pub use cache_control::no_cache;
pub use csrf::{CSRF_HEADER, CsrfConfig, csrf_guard, validate_csrf};
pub use origin::{cors_layer, origin_guard};
pub use session::{CurrentSession, SESSION_COOKIE_NAME, capture_session};
