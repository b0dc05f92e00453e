//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## ハンドラ一覧
//!
//! - `health`: ヘルスチェック
//! - `auth`: 認証関連（ログイン、ログアウト、CSRF トークン）
//! - `resource`: 所有者付きリソースの変更（認可判断あり）
//! - `proxy`: 上記以外の `/api/` 配下の転送

pub mod auth;
pub mod health;
pub mod proxy;
pub mod resource;

pub use auth::{AuthState, csrf, login, logout, me};
pub use health::{ReadinessState, health_check, readiness_check};
pub use proxy::{ProxyState, proxy};
pub use resource::{ResourceState, delete_resource, forward_resource, update_resource};
