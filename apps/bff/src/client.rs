//! # 外部 API クライアント
//!
//! 認証サービスと上流 API との通信を担当する。

pub mod auth_service;
pub mod forwarder;
pub mod resource_api;

pub use auth_service::{AuthServiceClient, AuthServiceClientImpl, AuthServiceError, VerifiedUser};
pub use forwarder::{Forwarder, ensure_canonical_path};
pub use resource_api::{
    ResourceApiClient,
    ResourceApiClientImpl,
    ResourceApiError,
    ResourceRecord,
};
