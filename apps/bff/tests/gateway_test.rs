//! # ゲートウェイ統合テスト
//!
//! `build_app` で構築したルーター全体に対して、ローカルに起動した上流サーバーを
//! 相手にリクエストを流し、セキュリティ上の振る舞いを検証する。
//!
//! - CSRF / Origin で拒否されたリクエストは上流に届かない
//! - 上流には BFF が保持する資格情報だけが付与される
//! - 所有者でも管理者でもないユーザーはリソースを削除できない
//! - パスの書き換えや PATCH / サブリソース経由でも所有者確認を迂回できない
//! - ログアウト後のセッションは復活しない
//! - 資格情報が失効してもセッションが有効なら再発行される

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Json,
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use bastion_bff::{
    AppDependencies,
    BffConfig,
    build_app,
    client::{AuthServiceClient, AuthServiceError, ResourceApiClientImpl, VerifiedUser},
};
use bastion_domain::{
    authorization::AuthorizationEngine,
    policy::{OWNER_OR_ADMIN, PolicyRegistryBuilder},
    role::Role,
    user::{UserId, Username},
};
use bastion_infra::{InMemorySessionManager, JwtCredentialIssuer, SessionManager};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

const ALLOWED_ORIGIN: &str = "https://app.example.com";
const SIGNING_SECRET: &str = "integration-signing-secret-0123456789";

// --- 上流サーバー ---

/// 上流が受け取ったリクエスト
#[derive(Debug, Clone)]
struct RecordedCall {
    method:        Method,
    path:          String,
    authorization: Option<String>,
    cookie:        Option<String>,
    csrf_token:    Option<String>,
    request_id:    Option<String>,
}

#[derive(Clone, Default)]
struct UpstreamLog(Arc<Mutex<Vec<RecordedCall>>>);

impl UpstreamLog {
    fn record(&self, method: &Method, path: &str, headers: &HeaderMap) {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.0.lock().unwrap().push(RecordedCall {
            method:        method.clone(),
            path:          path.to_string(),
            authorization: get("authorization"),
            cookie:        get("cookie"),
            csrf_token:    get("x-csrf-token"),
            request_id:    get("x-request-id"),
        });
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().unwrap().clone()
    }

    fn calls_with(&self, method: &Method) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| &c.method == method)
            .collect()
    }
}

fn owner_of(id: &str) -> Option<&'static str> {
    match id {
        "doc-mary" => Some("mary"),
        "doc-john" => Some("john"),
        _ => None,
    }
}

async fn upstream_resource(
    State(log): State<UpstreamLog>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    log.record(&method, &format!("/v1/resources/{id}"), &headers);

    let Some(owner) = owner_of(&id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"title": "Not Found"}))).into_response();
    };

    match method {
        Method::DELETE => StatusCode::NO_CONTENT.into_response(),
        Method::PUT => {
            let mut data = json!({"id": id, "owner": owner});
            if let (Ok(Value::Object(changes)), Value::Object(target)) =
                (serde_json::from_slice::<Value>(&body), &mut data)
            {
                target.extend(changes);
            }
            Json(json!({"data": data})).into_response()
        }
        _ => Json(json!({"data": {"id": id, "owner": owner, "title": "報告書"}})).into_response(),
    }
}

async fn upstream_status(
    State(log): State<UpstreamLog>,
    Path(code): Path<u16>,
    method: Method,
    headers: HeaderMap,
) -> impl IntoResponse {
    log.record(&method, &format!("/v1/status/{code}"), &headers);
    let status = StatusCode::from_u16(code).unwrap();
    (status, Json(json!({"status": code})))
}

async fn upstream_echo(
    State(log): State<UpstreamLog>,
    method: Method,
    headers: HeaderMap,
    request: Request<Body>,
) -> impl IntoResponse {
    let path = request.uri().path().to_string();
    log.record(&method, &path, &headers);
    Json(json!({"data": {"path": path}}))
}

/// 上流サーバーを起動し、アドレスと記録を返す
async fn spawn_upstream() -> (SocketAddr, UpstreamLog) {
    let log = UpstreamLog::default();
    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route(
            "/v1/resources/{id}",
            get(upstream_resource)
                .delete(upstream_resource)
                .put(upstream_resource)
                .patch(upstream_resource),
        )
        .route("/v1/status/{code}", get(upstream_status).post(upstream_status))
        .fallback(upstream_echo)
        .with_state(log.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, log)
}

/// 何も待ち受けていないアドレスを返す
async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

// --- Auth Service スタブ ---

struct StubDirectory;

#[async_trait]
impl AuthServiceClient for StubDirectory {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<VerifiedUser, AuthServiceError> {
        let roles = match (username, password) {
            ("john" | "mary", "password") => vec![Role::user()],
            ("admin", "password") => vec![Role::admin()],
            _ => return Err(AuthServiceError::AuthenticationFailed),
        };
        Ok(VerifiedUser {
            user_id: UserId::new(),
            username: Username::new(username).unwrap(),
            display_name: username.to_string(),
            roles,
        })
    }
}

// --- ゲートウェイ ---

struct Gateway {
    app:      Router,
    sessions: Arc<InMemorySessionManager>,
}

fn config(upstream: SocketAddr, overrides: &[(&'static str, &str)]) -> BffConfig {
    let mut env: HashMap<&str, String> = HashMap::from([
        ("BFF_PORT", "13000".to_string()),
        ("UPSTREAM_URL", format!("http://{upstream}")),
        ("AUTH_URL", "http://127.0.0.1:1".to_string()),
        ("ALLOWED_ORIGINS", format!("{ALLOWED_ORIGIN},https://*.partner.example")),
        ("CREDENTIAL_SIGNING_SECRET", SIGNING_SECRET.to_string()),
        ("COOKIE_SECURE", "false".to_string()),
        ("MAX_BODY_BYTES", "1024".to_string()),
    ]);
    for (name, value) in overrides {
        env.insert(*name, (*value).to_string());
    }
    BffConfig::from_lookup(|name| env.get(name).cloned()).unwrap()
}

fn gateway(config: &BffConfig) -> Gateway {
    let sessions = Arc::new(InMemorySessionManager::new());
    let registry = PolicyRegistryBuilder::with_defaults()
        .build(&[OWNER_OR_ADMIN])
        .unwrap();
    let deps = AppDependencies {
        session_manager:     sessions.clone(),
        credential_issuer:   Arc::new(
            JwtCredentialIssuer::new(
                SIGNING_SECRET.as_bytes(),
                "bastion-bff",
                config.credential_ttl,
            )
            .unwrap(),
        ),
        auth_service_client: Arc::new(StubDirectory),
        resource_client:     Arc::new(
            ResourceApiClientImpl::new(&config.upstream_url, config.upstream_timeout).unwrap(),
        ),
        authorization:       AuthorizationEngine::new(Arc::new(registry)),
    };
    Gateway {
        app: build_app(config, deps).unwrap(),
        sessions,
    }
}

/// ログイン済みブラウザの Cookie と CSRF トークン
struct Browser {
    session_id: String,
    csrf_token: String,
}

impl Browser {
    fn cookie(&self) -> String {
        format!("session_id={}; csrf_token={}", self.session_id, self.csrf_token)
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|line| {
            let pair = line.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.to_string())
        })
}

impl Gateway {
    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn login(&self, username: &str) -> Browser {
        let response = self
            .send(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/auth/login")
                    .header(header::ORIGIN, ALLOWED_ORIGIN)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({"username": username, "password": "password"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        Browser {
            session_id: cookie_value(response.headers(), "session_id").unwrap(),
            csrf_token: cookie_value(response.headers(), "csrf_token").unwrap(),
        }
    }

    async fn state_changing(
        &self,
        browser: &Browser,
        method: Method,
        uri: &str,
        csrf_token: Option<&str>,
        body: Body,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ORIGIN, ALLOWED_ORIGIN)
            .header(header::COOKIE, browser.cookie())
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = csrf_token {
            builder = builder.header("x-csrf-token", token);
        }
        self.send(builder.body(body).unwrap()).await
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- テスト ---

#[tokio::test]
async fn test_csrfトークンなしの状態変更は上流に届かない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    let response = gw
        .state_changing(&browser, Method::POST, "/api/v1/items", None, Body::from("{}"))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["type"], "https://bastion.example.com/errors/csrf-validation-failed");
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_csrfトークン不一致の状態変更は上流に届かない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    let response = gw
        .state_changing(
            &browser,
            Method::DELETE,
            "/api/v1/resources/doc-john",
            Some("forged-token"),
            Body::empty(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_正しいcsrfトークンの状態変更は転送される() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    let response = gw
        .state_changing(
            &browser,
            Method::POST,
            "/api/v1/items",
            Some(&browser.csrf_token),
            Body::from(r#"{"name":"x"}"#),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = log.calls_with(&Method::POST);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, "/v1/items");
}

#[tokio::test]
async fn test_上流にはブラウザの認証情報ではなくbffの資格情報が付与される() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    let response = gw
        .send(
            Request::builder()
                .uri("/api/v1/items?page=2")
                .header(header::COOKIE, browser.cookie())
                .header(header::AUTHORIZATION, "Bearer attacker-supplied")
                .header("x-csrf-token", &browser.csrf_token)
                .header("x-request-id", "req-from-client-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = log.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    let authorization = call.authorization.as_deref().unwrap();
    assert!(authorization.starts_with("Bearer "));
    assert_ne!(authorization, "Bearer attacker-supplied");
    assert_eq!(call.cookie, None);
    assert_eq!(call.csrf_token, None);
    assert_eq!(call.request_id.as_deref(), Some("req-from-client-1"));
}

#[tokio::test]
async fn test_セッションなしのリクエストは401で上流に届かない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));

    let response = gw
        .send(
            Request::builder()
                .uri("/api/v1/items")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_上流の401と403はそのまま返される() {
    let (addr, _log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    for code in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
        let response = gw
            .send(
                Request::builder()
                    .uri(format!("/api/v1/status/{}", code.as_u16()))
                    .header(header::COOKIE, browser.cookie())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), code);
        assert_eq!(json_body(response).await, json!({"status": code.as_u16()}));
    }
}

#[tokio::test]
async fn test_上流に接続できない場合は502を返す() {
    let addr = closed_address().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    let response = gw
        .send(
            Request::builder()
                .uri("/api/v1/items")
                .header(header::COOKIE, browser.cookie())
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["type"], "https://bastion.example.com/errors/upstream-unavailable");
}

#[tokio::test]
async fn test_上限を超えるボディは413を返し上流に届かない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    let response = gw
        .state_changing(
            &browser,
            Method::POST,
            "/api/v1/items",
            Some(&browser.csrf_token),
            Body::from("x".repeat(4096)),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_ログアウト後のセッションは復活しない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    let response = gw
        .state_changing(
            &browser,
            Method::POST,
            "/api/v1/auth/logout",
            Some(&browser.csrf_token),
            Body::empty(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(gw.sessions.get(&browser.session_id).await.unwrap().is_none());

    let me = gw
        .send(
            Request::builder()
                .uri("/api/v1/auth/me")
                .header(header::COOKIE, browser.cookie())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);

    let proxied = gw
        .send(
            Request::builder()
                .uri("/api/v1/items")
                .header(header::COOKIE, browser.cookie())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(proxied.status(), StatusCode::UNAUTHORIZED);
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_許可されていないoriginは403で上流に届かない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let browser = gw.login("john").await;

    for origin in ["https://evil.example.com", "https://app.example.com.evil.test", "null"] {
        let response = gw
            .send(
                Request::builder()
                    .uri("/api/v1/items")
                    .header(header::ORIGIN, origin)
                    .header(header::COOKIE, browser.cookie())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN, "origin: {origin}");
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_許可されたoriginにはcorsヘッダーが付与される() {
    let (addr, _log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));

    for origin in [ALLOWED_ORIGIN, "https://shop.partner.example"] {
        let response = gw
            .send(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/items")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-csrf-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            origin
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }
}

#[tokio::test]
async fn test_所有者でも管理者でもないユーザーは削除できない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let john = gw.login("john").await;

    let response = gw
        .state_changing(
            &john,
            Method::DELETE,
            "/api/v1/resources/doc-mary",
            Some(&john.csrf_token),
            Body::empty(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(log.calls_with(&Method::DELETE).is_empty());
}

#[tokio::test]
async fn test_管理者は他人のリソースを削除できる() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let admin = gw.login("admin").await;

    let response = gw
        .state_changing(
            &admin,
            Method::DELETE,
            "/api/v1/resources/doc-mary",
            Some(&admin.csrf_token),
            Body::empty(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let deletes = log.calls_with(&Method::DELETE);
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].path, "/v1/resources/doc-mary");
}

#[tokio::test]
async fn test_所有者は自分のリソースを更新できる() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let mary = gw.login("mary").await;

    let response = gw
        .state_changing(
            &mary,
            Method::PUT,
            "/api/v1/resources/doc-mary",
            Some(&mary.csrf_token),
            Body::from(r#"{"title":"改訂版"}"#),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["title"], "改訂版");
    assert_eq!(body["data"]["owner"], "mary");
    assert_eq!(log.calls_with(&Method::PUT).len(), 1);
}

#[tokio::test]
async fn test_拒否を隠す設定では他人のリソース削除が404になる() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[("HIDE_FORBIDDEN_RESOURCES", "true")]));
    let john = gw.login("john").await;

    let response = gw
        .state_changing(
            &john,
            Method::DELETE,
            "/api/v1/resources/doc-mary",
            Some(&john.csrf_token),
            Body::empty(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(log.calls_with(&Method::DELETE).is_empty());
}

#[tokio::test]
async fn test_存在しないリソースの削除は404を返す() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let admin = gw.login("admin").await;

    let response = gw
        .state_changing(
            &admin,
            Method::DELETE,
            "/api/v1/resources/doc-unknown",
            Some(&admin.csrf_token),
            Body::empty(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(log.calls_with(&Method::DELETE).is_empty());
}

#[tokio::test]
async fn test_ドットセグメントを含むパスでは所有者確認を迂回できない() {
    // Given: mary のリソースと一般ユーザー john
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let john = gw.login("john").await;

    for uri in [
        "/api/v1/./resources/doc-mary",
        "/api/v1/items/../resources/doc-mary",
        "/api/v1/items/%2e%2e/resources/doc-mary",
        "/api/v1/%2E/resources/doc-mary",
    ] {
        // When: 上流の URL 解決で /v1/resources/doc-mary になるパス
        let response = gw
            .state_changing(
                &john,
                Method::DELETE,
                uri,
                Some(&john.csrf_token),
                Body::empty(),
            )
            .await;

        // Then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {uri}");
    }
    assert!(log.calls().is_empty());
}

#[tokio::test]
async fn test_末尾スラッシュのパスでは所有者確認を迂回できない() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let john = gw.login("john").await;

    let response = gw
        .state_changing(
            &john,
            Method::DELETE,
            "/api/v1/resources/doc-mary/",
            Some(&john.csrf_token),
            Body::empty(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(log.calls_with(&Method::DELETE).is_empty());
}

#[tokio::test]
async fn test_所有者でも管理者でもないユーザーのpatchは上流に届かない() {
    // Given
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let john = gw.login("john").await;

    // When
    let response = gw
        .state_changing(
            &john,
            Method::PATCH,
            "/api/v1/resources/doc-mary",
            Some(&john.csrf_token),
            Body::from(r#"{"title":"改ざん"}"#),
        )
        .await;

    // Then: ロードの GET だけが届き、PATCH は届かない
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(log.calls_with(&Method::PATCH).is_empty());
    assert_eq!(log.calls_with(&Method::GET).len(), 1);
}

#[tokio::test]
async fn test_所有者のpatchは認可の後に上流へ転送される() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let mary = gw.login("mary").await;

    let response = gw
        .state_changing(
            &mary,
            Method::PATCH,
            "/api/v1/resources/doc-mary",
            Some(&mary.csrf_token),
            Body::from(r#"{"title":"改訂版"}"#),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let patches = log.calls_with(&Method::PATCH);
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].path, "/v1/resources/doc-mary");
}

#[tokio::test]
async fn test_サブリソースへの変更も所有者確認を通る() {
    // Given
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let john = gw.login("john").await;
    let mary = gw.login("mary").await;

    // When: 他人のリソース配下への POST
    let denied = gw
        .state_changing(
            &john,
            Method::POST,
            "/api/v1/resources/doc-mary/archive",
            Some(&john.csrf_token),
            Body::empty(),
        )
        .await;
    let allowed = gw
        .state_changing(
            &mary,
            Method::POST,
            "/api/v1/resources/doc-mary/archive",
            Some(&mary.csrf_token),
            Body::empty(),
        )
        .await;

    // Then: 所有者の 1 件だけが届く
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(allowed.status(), StatusCode::OK);
    let posts = log.calls_with(&Method::POST);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].path, "/v1/resources/doc-mary/archive");
}

#[tokio::test]
async fn test_資格情報が失効してもセッションが有効なら再発行して転送される() {
    // Given: 資格情報の有効期間がセッションより短い
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[("CREDENTIAL_TTL_SECONDS", "1")]));
    let john = gw.login("john").await;
    let get_items = || {
        Request::builder()
            .uri("/api/v1/items")
            .header(header::COOKIE, john.cookie())
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(gw.send(get_items()).await.status(), StatusCode::OK);

    // When: 資格情報の失効後に同じセッションで呼び出す
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
    let response = gw.send(get_items()).await;

    // Then: 新しい資格情報で転送され、セッションにも保存される
    assert_eq!(response.status(), StatusCode::OK);
    let calls = log.calls();
    assert_eq!(calls.len(), 2);
    assert_ne!(calls[0].authorization, calls[1].authorization);
    let stored = gw
        .sessions
        .get_credential(&john.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        calls[1].authorization.as_deref(),
        Some(stored.bearer().as_str())
    );
}

#[tokio::test]
async fn test_リソースの参照は上流へ転送される() {
    let (addr, log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));
    let john = gw.login("john").await;

    let response = gw
        .send(
            Request::builder()
                .uri("/api/v1/resources/doc-mary")
                .header(header::COOKIE, john.cookie())
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let gets = log.calls_with(&Method::GET);
    assert_eq!(gets.len(), 1);
    assert_eq!(gets[0].path, "/v1/resources/doc-mary");
}

#[tokio::test]
async fn test_レディネスチェックは上流とセッションストアを確認する() {
    let (addr, _log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));

    let response = gw
        .send(
            Request::builder()
                .uri("/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["session_store"], "ok");
    assert_eq!(body["checks"]["upstream"], "ok");
}

#[tokio::test]
async fn test_クライアント提供のx_request_idがそのまま返される() {
    let (addr, _log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));

    let response = gw
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "client-provided-request-id-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "client-provided-request-id-123"
    );
}

#[tokio::test]
async fn test_エラーレスポンスにも自動生成のuuid_v7のx_request_idが付与される() {
    let (addr, _log) = spawn_upstream().await;
    let gw = gateway(&config(addr, &[]));

    let response = gw
        .send(
            Request::builder()
                .uri("/api/v1/items")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let request_id = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap();
    let uuid = uuid::Uuid::parse_str(request_id)
        .unwrap_or_else(|_| panic!("有効な UUID であること: {request_id}"));
    assert_eq!(uuid.get_version(), Some(uuid::Version::SortRand));
}
