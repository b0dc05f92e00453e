//! # セッション管理
//!
//! セッション・CSRF トークン・バックエンド資格情報の 3 つを、
//! 同一の寿命で管理するセッションストアを提供する。
//!
//! ## 寿命の不変条件
//!
//! - CSRF トークンと資格情報は、セッションが存在する間にしか保存できない
//! - セッションの削除は、CSRF トークンと資格情報を同時に（アトミックに）無効化する
//! - CSRF トークンと資格情報の有効期限は、セッションの残り有効期限を超えない
//!
//! ## 実装
//!
//! | 実装 | 用途 |
//! |-----|------|
//! | [`RedisSessionManager`] | 本番。複数プロセスでセッションを共有する |
//! | [`InMemorySessionManager`] | 単一プロセス。開発環境と統合テスト |
//!
//! ## リクエスト内の一貫性
//!
//! リクエスト受信時に [`SessionManager::snapshot`] で 3 つの値を一度に読み取り、
//! 以降のパイプラインはそのスナップショットのみを参照する。
//! 処理中に別リクエストがログアウトしても、同一リクエスト内で観測する状態は変わらない。

mod in_memory;
mod redis_session;

use async_trait::async_trait;
use bastion_domain::{
    identity::Identity,
    role::Role,
    user::{UserId, Username},
};
use chrono::{DateTime, Duration, Utc};
pub use in_memory::InMemorySessionManager;
pub use redis_session::RedisSessionManager;
use serde::{Deserialize, Serialize};

use crate::{InfraError, credential::BackendCredential};

/// セッションの既定の有効期限（秒）
/// 8時間 = 28800秒
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 28800;

/// セッションデータ
///
/// ログイン成功時に作成され、ログアウトまたは有効期限経過で削除される。
/// 発行後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    user_id:      UserId,
    username:     Username,
    display_name: String,
    roles:        Vec<Role>,
    created_at:   DateTime<Utc>,
    expires_at:   DateTime<Utc>,
}

impl SessionData {
    /// 新しいセッションデータを作成する
    ///
    /// `created_at` は現在時刻、`expires_at` は現在時刻 + `ttl` で初期化される。
    pub fn new(
        user_id: UserId,
        username: Username,
        display_name: String,
        roles: Vec<Role>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username,
            display_name,
            roles,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// 指定時刻時点で期限切れか
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// 指定時刻からの残り有効期限（秒、切り捨て）
    ///
    /// 期限切れの場合は 0。
    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// 認可判断に使う Identity を構築する
    pub fn identity(&self) -> Identity {
        Identity::new(
            self.user_id.clone(),
            self.username.clone(),
            self.display_name.clone(),
            self.roles.clone(),
        )
    }
}

/// リクエスト受信時に一度だけ読み取るセッション状態
///
/// セッション本体・CSRF トークン・資格情報を同一時点で読み取ったもの。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    session_id: String,
    data:       SessionData,
    csrf_token: Option<String>,
    credential: Option<BackendCredential>,
}

impl SessionSnapshot {
    pub fn new(
        session_id: String,
        data: SessionData,
        csrf_token: Option<String>,
        credential: Option<BackendCredential>,
    ) -> Self {
        Self {
            session_id,
            data,
            csrf_token,
            credential,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn credential(&self) -> Option<&BackendCredential> {
        self.credential.as_ref()
    }
}

/// セッション管理トレイト
///
/// セッションと、それに紐づく CSRF トークン・資格情報の作成・取得・削除を行う。
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// セッションを作成し、セッション ID を返す
    ///
    /// # 戻り値
    ///
    /// 生成されたセッション ID（UUID v4、122 ビットの乱数）
    async fn create(&self, data: &SessionData) -> Result<String, InfraError>;

    /// セッションを取得する
    ///
    /// 存在しない、または期限切れの場合は `None`。
    async fn get(&self, session_id: &str) -> Result<Option<SessionData>, InfraError>;

    /// セッション・CSRF トークン・資格情報を一度に読み取る
    ///
    /// セッションが存在しない場合は `None`（CSRF トークンや資格情報が
    /// 残っていても返さない）。
    async fn snapshot(&self, session_id: &str) -> Result<Option<SessionSnapshot>, InfraError>;

    /// セッションを削除する
    ///
    /// CSRF トークンと資格情報も同時に削除する。
    /// 存在しないセッションを削除しても成功とする。
    async fn delete(&self, session_id: &str) -> Result<(), InfraError>;

    /// CSRF トークンを生成して保存する
    ///
    /// 既存のトークンは置き換える（1 セッションにつき有効なトークンは 1 つ）。
    ///
    /// # エラー
    ///
    /// セッションが存在しない場合は `InfraErrorKind::SessionNotFound`。
    async fn create_csrf_token(&self, session_id: &str) -> Result<String, InfraError>;

    /// CSRF トークンを取得する
    async fn get_csrf_token(&self, session_id: &str) -> Result<Option<String>, InfraError>;

    /// 資格情報を保存する
    ///
    /// # エラー
    ///
    /// セッションが存在しない場合は `InfraErrorKind::SessionNotFound`。
    async fn store_credential(
        &self,
        session_id: &str,
        credential: &BackendCredential,
    ) -> Result<(), InfraError>;

    /// 資格情報を取得する
    async fn get_credential(
        &self,
        session_id: &str,
    ) -> Result<Option<BackendCredential>, InfraError>;

    /// セッションの TTL（残り秒数）を取得する
    async fn get_ttl(&self, session_id: &str) -> Result<Option<i64>, InfraError>;

    /// ストアへの疎通を確認する（Readiness Check 用）
    async fn ping(&self) -> Result<(), InfraError>;
}
