//! # Bastion BFF サーバー
//!
//! ブラウザとリソース API の間に立つセキュリティゲートウェイ。
//!
//! ## 役割
//!
//! - **認証・セッション管理**: HttpOnly Cookie によるサーバーサイドセッション
//! - **CSRF 防御**: 状態変更リクエストのトークン検証
//! - **Origin 検証**: 許可リストによる CORS と Origin チェック
//! - **資格情報の代理**: ブラウザに渡さない Bearer トークンを上流へ付与
//! - **リソース認可**: 所有者または管理者だけが削除・更新できる
//!
//! ## アーキテクチャ
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Browser    │────▶│     BFF      │────▶│ Resource API │
//! │              │     │  port: 13000 │     │  port: 13001 │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                        │          │
//!                        ▼          ▼
//!               ┌──────────────┐  ┌──────────────┐
//!               │    Redis     │  │ Auth Service │
//!               │  (Session)   │  │  port: 13002 │
//!               └──────────────┘  └──────────────┘
//! ```
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `BFF_HOST` | No | バインドアドレス（デフォルト: `0.0.0.0`） |
//! | `BFF_PORT` | **Yes** | ポート番号 |
//! | `REDIS_URL` | No | Redis 接続 URL（未設定ならインメモリストア） |
//! | `UPSTREAM_URL` | **Yes** | リソース API の URL |
//! | `AUTH_URL` | **Yes** | Auth Service の URL |
//! | `ALLOWED_ORIGINS` | **Yes** | 許可する Origin（カンマ区切り、`https://*.example.com` 形式可） |
//! | `CSRF_PROTECTED_PREFIXES` | No | CSRF 検証対象のパスプレフィックス（デフォルト: `/api/`） |
//! | `CREDENTIAL_SIGNING_SECRET` | **Yes** | 資格情報の署名鍵（32 バイト以上） |
//! | `CREDENTIAL_TTL_SECONDS` | No | 資格情報の有効期間（デフォルト: 900） |
//! | `SESSION_TTL_SECONDS` | No | セッションの有効期間（デフォルト: 28800） |
//! | `UPSTREAM_TIMEOUT_SECONDS` | No | 上流呼び出しのタイムアウト（デフォルト: 10） |
//! | `MAX_BODY_BYTES` | No | リクエストボディの上限（デフォルト: 2 MiB） |
//! | `UPSTREAM_STRIP_PREFIX` | No | 上流へ転送する前に取り除くパスプレフィックス（デフォルト: `/api`） |
//! | `COOKIE_SECURE` | No | Cookie に `Secure` 属性を付与する（デフォルト: `true`） |
//! | `HIDE_FORBIDDEN_RESOURCES` | No | 認可拒否を 404 として返す（デフォルト: `false`） |
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（.env ファイルを使用）
//! cargo run -p bastion-bff
//!
//! # 本番環境（環境変数を直接指定）
//! BFF_PORT=3000 REDIS_URL=redis://... cargo run -p bastion-bff --release
//! ```

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use bastion_bff::{
    AppDependencies,
    BffConfig,
    build_app,
    client::{AuthServiceClient, AuthServiceClientImpl, ResourceApiClient, ResourceApiClientImpl},
};
use bastion_domain::{
    authorization::AuthorizationEngine,
    policy::{OWNER_OR_ADMIN, PolicyRegistryBuilder},
};
use bastion_infra::{
    CredentialIssuer,
    InMemorySessionManager,
    JwtCredentialIssuer,
    RedisSessionManager,
    SessionManager,
    credential::DEFAULT_ISSUER,
};
use bastion_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;

/// BFF サーバーのエントリーポイント
///
/// 以下の順序で初期化を行う:
///
/// 1. 環境変数の読み込み（.env ファイル）
/// 2. トレーシングの初期化
/// 3. アプリケーション設定の読み込み
/// 4. 依存関係の初期化（起動時にポリシーを検証）
/// 5. ルーターの構築
/// 6. HTTP サーバーの起動
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let tracing_config = TracingConfig::from_env("bastion-bff");
    init_tracing(tracing_config);
    let _tracing_guard = tracing::info_span!("app", service = "bastion-bff").entered();

    let config = BffConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!("BFF サーバーを起動します: {}:{}", config.host, config.port);

    let session_manager: Arc<dyn SessionManager> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisSessionManager::new(url)
                .await
                .context("Redis への接続に失敗しました")?,
        ),
        None => {
            tracing::warn!(
                "REDIS_URL が未設定のためインメモリのセッションストアを使用します。\
                 複数インスタンス構成では使用しないでください"
            );
            Arc::new(InMemorySessionManager::new())
        }
    };

    let credential_issuer: Arc<dyn CredentialIssuer> = Arc::new(
        JwtCredentialIssuer::new(
            config.credential_signing_secret.as_bytes(),
            DEFAULT_ISSUER,
            config.credential_ttl,
        )
        .context("資格情報の発行者を初期化できませんでした")?,
    );

    // 未登録のポリシーを参照していれば起動しない
    let registry = PolicyRegistryBuilder::with_defaults()
        .build(&[OWNER_OR_ADMIN])
        .context("認可ポリシーの検証に失敗しました")?;
    let authorization = AuthorizationEngine::new(Arc::new(registry));

    let auth_service_client: Arc<dyn AuthServiceClient> = Arc::new(
        AuthServiceClientImpl::new(&config.auth_url, config.upstream_timeout)
            .context("Auth Service クライアントを構築できませんでした")?,
    );
    let resource_client: Arc<dyn ResourceApiClient> = Arc::new(
        ResourceApiClientImpl::new(&config.upstream_url, config.upstream_timeout)
            .context("リソース API クライアントを構築できませんでした")?,
    );

    let app = build_app(
        &config,
        AppDependencies {
            session_manager,
            credential_issuer,
            auth_service_client,
            resource_client,
            authorization,
        },
    )
    .context("ルーターの構築に失敗しました")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("アドレスのパースに失敗しました")?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("BFF サーバーが起動しました: {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
