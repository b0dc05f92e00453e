//! # インメモリセッションマネージャ
//!
//! 単一プロセス内でセッションを保持する実装。`REDIS_URL` 未設定時と統合テストで使う。
//!
//! セッション本体・CSRF トークン・資格情報を 1 つのエントリにまとめて保持するため、
//! セッション削除は単一のエントリ削除でアトミックに完了する。
//! 同一セッションへの書き込みは書き込みロックで直列化される。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SessionData, SessionManager, SessionSnapshot};
use crate::{InfraError, credential::BackendCredential, csrf::generate_csrf_token};

#[derive(Debug, Clone)]
struct Entry {
    data:       SessionData,
    csrf_token: Option<String>,
    credential: Option<BackendCredential>,
}

/// インメモリセッションマネージャ
#[derive(Debug, Default)]
pub struct InMemorySessionManager {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 有効なエントリを書き込みロック下で更新する
    ///
    /// 期限切れのエントリはこの時点で取り除き、存在しないものとして扱う。
    async fn update_live<F>(&self, session_id: &str, f: F) -> Result<(), InfraError>
    where
        F: FnOnce(&mut Entry),
    {
        let mut entries = self.entries.write().await;
        match entries.get_mut(session_id) {
            Some(entry) if !entry.data.is_expired_at(Utc::now()) => {
                f(entry);
                Ok(())
            }
            Some(_) => {
                entries.remove(session_id);
                Err(InfraError::session_not_found())
            }
            None => Err(InfraError::session_not_found()),
        }
    }

    /// 有効なエントリを読み取る
    async fn read_live<T>(&self, session_id: &str, f: impl FnOnce(&Entry) -> T) -> Option<T> {
        let entries = self.entries.read().await;
        entries
            .get(session_id)
            .filter(|entry| !entry.data.is_expired_at(Utc::now()))
            .map(f)
    }
}

#[async_trait]
impl SessionManager for InMemorySessionManager {
    async fn create(&self, data: &SessionData) -> Result<String, InfraError> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.data.is_expired_at(now));
        entries.insert(
            session_id.clone(),
            Entry {
                data:       data.clone(),
                csrf_token: None,
                credential: None,
            },
        );

        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionData>, InfraError> {
        Ok(self.read_live(session_id, |entry| entry.data.clone()).await)
    }

    async fn snapshot(&self, session_id: &str) -> Result<Option<SessionSnapshot>, InfraError> {
        Ok(self
            .read_live(session_id, |entry| {
                SessionSnapshot::new(
                    session_id.to_string(),
                    entry.data.clone(),
                    entry.csrf_token.clone(),
                    entry.credential.clone(),
                )
            })
            .await)
    }

    async fn delete(&self, session_id: &str) -> Result<(), InfraError> {
        self.entries.write().await.remove(session_id);
        Ok(())
    }

    async fn create_csrf_token(&self, session_id: &str) -> Result<String, InfraError> {
        let token = generate_csrf_token();
        self.update_live(session_id, |entry| {
            entry.csrf_token = Some(token.clone());
        })
        .await?;
        Ok(token)
    }

    async fn get_csrf_token(&self, session_id: &str) -> Result<Option<String>, InfraError> {
        Ok(self
            .read_live(session_id, |entry| entry.csrf_token.clone())
            .await
            .flatten())
    }

    async fn store_credential(
        &self,
        session_id: &str,
        credential: &BackendCredential,
    ) -> Result<(), InfraError> {
        self.update_live(session_id, |entry| {
            entry.credential = Some(credential.clone());
        })
        .await
    }

    async fn get_credential(
        &self,
        session_id: &str,
    ) -> Result<Option<BackendCredential>, InfraError> {
        Ok(self
            .read_live(session_id, |entry| entry.credential.clone())
            .await
            .flatten())
    }

    async fn get_ttl(&self, session_id: &str) -> Result<Option<i64>, InfraError> {
        Ok(self
            .read_live(session_id, |entry| {
                entry.data.remaining_seconds_at(Utc::now())
            })
            .await)
    }

    async fn ping(&self) -> Result<(), InfraError> {
        Ok(())
    }
}
