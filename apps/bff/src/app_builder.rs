//! # アプリケーション構築
//!
//! State の初期化とルーター構築を担当する。
//! `main.rs` はインフラ初期化とサーバー起動に集中し、統合テストは
//! スタブを注入した依存でこの関数を呼ぶ。

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{any, delete, get, post},
};
use bastion_domain::authorization::AuthorizationEngine;
use bastion_infra::{CredentialIssuer, CredentialVault, SessionManager};
use bastion_shared::observability::{MakeRequestUuidV7, make_request_span};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    client::{AuthServiceClient, Forwarder, ResourceApiClient},
    config::BffConfig,
    handler::{
        AuthState,
        ProxyState,
        ReadinessState,
        ResourceState,
        csrf,
        delete_resource,
        forward_resource,
        health_check,
        login,
        logout,
        me,
        proxy,
        readiness_check,
        update_resource,
    },
    middleware::{
        CsrfConfig,
        capture_session,
        cors_layer,
        csrf_guard,
        no_cache,
        origin_guard,
        request_id::store_request_id,
    },
};

/// 外部から注入する依存
pub struct AppDependencies {
    pub session_manager:     Arc<dyn SessionManager>,
    pub credential_issuer:   Arc<dyn CredentialIssuer>,
    pub auth_service_client: Arc<dyn AuthServiceClient>,
    pub resource_client:     Arc<dyn ResourceApiClient>,
    pub authorization:       AuthorizationEngine,
}

/// ルーターを構築する
///
/// # エラー
///
/// 上流向け HTTP クライアントを構築できない場合。
pub fn build_app(config: &BffConfig, deps: AppDependencies) -> Result<Router, reqwest::Error> {
    let credential_vault =
        CredentialVault::new(deps.session_manager.clone(), deps.credential_issuer);

    let proxy_state = Arc::new(ProxyState {
        forwarder:        Forwarder::new(
            &config.upstream_url,
            &config.upstream_strip_prefix,
            config.upstream_timeout,
            config.max_body_bytes,
        )?,
        credential_vault: credential_vault.clone(),
    });

    let auth_state = Arc::new(AuthState {
        auth_service_client: deps.auth_service_client,
        session_manager:     deps.session_manager.clone(),
        credential_vault,
        session_ttl:         config.session_ttl,
        cookie_secure:       config.cookie_secure,
    });

    let resource_state = Arc::new(ResourceState {
        resource_client:          deps.resource_client,
        authorization:            deps.authorization,
        proxy:                    proxy_state.clone(),
        hide_forbidden_resources: config.hide_forbidden_resources,
    });

    let readiness_state = Arc::new(ReadinessState {
        session_manager: deps.session_manager.clone(),
        upstream_url:    config.upstream_url.clone(),
        http_client:     reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()?,
    });

    let allowlist = Arc::new(config.allowed_origins.clone());
    let csrf_config = Arc::new(CsrfConfig::new(config.csrf_protected_prefixes.clone()));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .with_state(readiness_state);

    let auth_routes = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/csrf", get(csrf))
        .with_state(auth_state);

    let resource_routes = Router::new()
        .route(
            "/api/v1/resources/{id}",
            delete(delete_resource)
                .put(update_resource)
                .fallback(forward_resource),
        )
        .route("/api/v1/resources/{id}/{*rest}", any(forward_resource))
        .with_state(resource_state);

    // レイヤー順序: 下に書いたものが外側
    // 1. SetRequestIdLayer（最外）: UUID v7 を生成（またはクライアント提供値を使用）
    // 2. TraceLayer: request_id を含むスパンを作成
    // 3. PropagateRequestIdLayer: レスポンスヘッダーに X-Request-Id をコピー
    // 4. store_request_id: task-local に保存し、上流呼び出しに伝播
    // 5. no_cache: 全レスポンスを Cache-Control: no-store に
    // 6. CORS: 許可リストにある Origin にだけ CORS ヘッダーを付与
    // 7. origin_guard: 許可リストにない Origin を拒否
    // 8. capture_session: セッションのスナップショットを取得
    // 9. csrf_guard（最内）: 状態変更リクエストの CSRF トークンを検証
    Ok(Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(resource_routes)
        .fallback(proxy)
        .with_state(proxy_state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(from_fn_with_state(csrf_config, csrf_guard))
        .layer(from_fn_with_state(deps.session_manager, capture_session))
        .layer(from_fn_with_state(allowlist.clone(), origin_guard))
        .layer(cors_layer(allowlist))
        .layer(from_fn(no_cache))
        .layer(from_fn(store_request_id))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7)))
}
