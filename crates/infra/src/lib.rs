//! # Bastion インフラ層
//!
//! セッションストアと資格情報の発行を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **セッションストア**: セッション・CSRF トークン・資格情報を同一の寿命で保持する
//!   （Redis / インメモリ）
//! - **資格情報**: リソース API に提示する Bearer トークン（JWT）の発行と検証
//! - **CSRF トークン**: 暗号論的に安全な乱数によるトークン生成
//!
//! ## 依存関係
//!
//! ```text
//! bff → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`session`] - セッション管理（`SessionManager` トレイトと実装）
//! - [`credential`] - 資格情報の発行と Credential Vault
//! - [`csrf`] - CSRF トークン生成
//! - [`error`] - インフラ層エラー定義
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use bastion_infra::{CredentialVault, JwtCredentialIssuer, RedisSessionManager};
//!
//! async fn setup(secret: &[u8]) -> Result<CredentialVault, bastion_infra::InfraError> {
//!     let sessions = Arc::new(RedisSessionManager::new("redis://localhost").await?);
//!     let issuer = Arc::new(JwtCredentialIssuer::new(
//!         secret,
//!         "bastion-bff",
//!         chrono::Duration::minutes(15),
//!     )?);
//!     Ok(CredentialVault::new(sessions, issuer))
//! }
//! ```

pub mod credential;
pub mod csrf;
pub mod error;
pub mod session;

pub use credential::{BackendCredential, CredentialIssuer, CredentialVault, JwtCredentialIssuer};
pub use error::{InfraError, InfraErrorKind};
pub use session::{
    InMemorySessionManager,
    RedisSessionManager,
    SessionData,
    SessionManager,
    SessionSnapshot,
};
