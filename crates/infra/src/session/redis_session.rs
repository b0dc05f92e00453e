//! # Redis セッションマネージャ
//!
//! ## Redis キー設計
//!
//! | キー | 値 | TTL |
//! |-----|-----|-----|
//! | `session:{session_id}` | SessionData (JSON) | セッションの残り有効期限 |
//! | `csrf:{session_id}` | CSRF トークン（64 文字の 16 進数） | `session:` キーの残り TTL |
//! | `credential:{session_id}` | BackendCredential (JSON) | `session:` キーの残り TTL |
//!
//! ## アトミック性
//!
//! - 読み取り: 3 キーを `MGET` で一度に取得する
//! - 削除: 3 キーを `MULTI/EXEC` で同時に削除する
//! - CSRF トークン・資格情報の保存: Lua スクリプトで `session:` キーの存在確認と
//!   `SET` を 1 コマンドとして実行する。ログアウトと競合しても、
//!   削除済みセッションに値が復活することはない

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use uuid::Uuid;

use super::{SessionData, SessionManager, SessionSnapshot};
use crate::{InfraError, credential::BackendCredential, csrf::generate_csrf_token};

/// `KEYS[1]` が存在する場合のみ、その残り TTL で `KEYS[2]` に `ARGV[1]` を保存する
///
/// 戻り値: 保存した場合 1、セッションが存在しない場合 0
static SET_IF_SESSION_ALIVE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local ttl = redis.call('PTTL', KEYS[1])
if ttl <= 0 then
    return 0
end
redis.call('SET', KEYS[2], ARGV[1], 'PX', ttl)
return 1
",
    )
});

/// Redis を使用したセッションマネージャ
#[derive(Clone)]
pub struct RedisSessionManager {
    conn: ConnectionManager,
}

impl RedisSessionManager {
    /// 新しい RedisSessionManager を作成する
    ///
    /// # 引数
    ///
    /// - `redis_url`: Redis 接続 URL（例: `redis://localhost:6379`）
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn session_key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    fn csrf_key(session_id: &str) -> String {
        format!("csrf:{session_id}")
    }

    fn credential_key(session_id: &str) -> String {
        format!("credential:{session_id}")
    }

    /// セッションが存在する場合のみ値を保存する
    async fn set_if_session_alive(
        &self,
        session_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), InfraError> {
        let mut conn = self.conn.clone();
        let mut invocation = SET_IF_SESSION_ALIVE.key(Self::session_key(session_id));
        invocation.key(key).arg(value);

        let stored: i64 = invocation.invoke_async(&mut conn).await?;
        if stored == 1 {
            Ok(())
        } else {
            Err(InfraError::session_not_found())
        }
    }
}

#[async_trait]
impl SessionManager for RedisSessionManager {
    async fn create(&self, data: &SessionData) -> Result<String, InfraError> {
        // UUID v4 でセッション ID を生成（暗号論的に安全なランダム値）
        let session_id = Uuid::new_v4().to_string();
        let ttl = data.remaining_seconds_at(Utc::now());
        if ttl <= 0 {
            return Err(InfraError::unexpected("有効期限切れのセッションは作成できません"));
        }
        let json = serde_json::to_string(data)?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::session_key(&session_id), json, ttl.unsigned_abs())
            .await?;

        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionData>, InfraError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.get(Self::session_key(session_id)).await?;

        match result {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn snapshot(&self, session_id: &str) -> Result<Option<SessionSnapshot>, InfraError> {
        let mut conn = self.conn.clone();
        let (session, csrf_token, credential): (Option<String>, Option<String>, Option<String>) =
            redis::cmd("MGET")
                .arg(Self::session_key(session_id))
                .arg(Self::csrf_key(session_id))
                .arg(Self::credential_key(session_id))
                .query_async(&mut conn)
                .await?;

        let Some(session) = session else {
            return Ok(None);
        };
        let data: SessionData = serde_json::from_str(&session)?;
        let credential = credential
            .map(|json| serde_json::from_str::<BackendCredential>(&json))
            .transpose()?;

        Ok(Some(SessionSnapshot::new(
            session_id.to_string(),
            data,
            csrf_token,
            credential,
        )))
    }

    async fn delete(&self, session_id: &str) -> Result<(), InfraError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(Self::session_key(session_id))
            .ignore()
            .del(Self::csrf_key(session_id))
            .ignore()
            .del(Self::credential_key(session_id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn create_csrf_token(&self, session_id: &str) -> Result<String, InfraError> {
        let token = generate_csrf_token();
        self.set_if_session_alive(session_id, &Self::csrf_key(session_id), &token)
            .await?;
        Ok(token)
    }

    async fn get_csrf_token(&self, session_id: &str) -> Result<Option<String>, InfraError> {
        let mut conn = self.conn.clone();
        let token: Option<String> = conn.get(Self::csrf_key(session_id)).await?;
        Ok(token)
    }

    async fn store_credential(
        &self,
        session_id: &str,
        credential: &BackendCredential,
    ) -> Result<(), InfraError> {
        let json = serde_json::to_string(credential)?;
        self.set_if_session_alive(session_id, &Self::credential_key(session_id), &json)
            .await
    }

    async fn get_credential(
        &self,
        session_id: &str,
    ) -> Result<Option<BackendCredential>, InfraError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(Self::credential_key(session_id)).await?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn get_ttl(&self, session_id: &str) -> Result<Option<i64>, InfraError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(Self::session_key(session_id)).await?;

        // TTL が -2 の場合はキーが存在しない、-1 の場合は TTL が設定されていない
        if ttl < 0 { Ok(None) } else { Ok(Some(ttl)) }
    }

    async fn ping(&self) -> Result<(), InfraError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
