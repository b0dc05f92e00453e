//! # バックエンド資格情報
//!
//! セッションから、リソース API に提示する Bearer トークンを発行し、
//! セッションストア内に保持する。
//!
//! ## 構成
//!
//! - [`CredentialIssuer`]: 検証済みの Identity から資格情報を発行・検証する
//! - [`JwtCredentialIssuer`]: HS256 署名の JWT による実装
//! - [`CredentialVault`]: セッション ID と資格情報の紐付け（bind / lookup）
//!
//! ## 不変条件
//!
//! - 資格情報はブラウザに渡さない。サーバー側のセッションストアにのみ保存する
//! - 資格情報の有効期限はセッションの有効期限を超えない
//! - セッションが削除されると資格情報も参照できなくなる

use std::{fmt, sync::Arc};

use bastion_domain::identity::Identity;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    InfraError,
    session::{SessionData, SessionManager, SessionSnapshot},
};

/// 署名鍵の最小バイト長
pub const MIN_SECRET_BYTES: usize = 32;

/// 資格情報の既定の有効期限（秒）
pub const DEFAULT_CREDENTIAL_TTL_SECONDS: i64 = 900;

/// `iss` クレームの既定値
pub const DEFAULT_ISSUER: &str = "bastion-bff";

/// バックエンド資格情報
///
/// `Debug` 出力ではトークンをマスクする。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCredential {
    token:      String,
    expires_at: DateTime<Utc>,
}

impl BackendCredential {
    pub fn new(token: String, expires_at: DateTime<Utc>) -> Self {
        Self { token, expires_at }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// `Authorization` ヘッダーの値
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for BackendCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// 資格情報に載せるクレーム
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    pub iss:   String,
    /// サブジェクトキー（ユーザー名）
    pub sub:   String,
    /// ユーザー ID
    pub uid:   String,
    pub roles: Vec<String>,
    pub iat:   i64,
    pub exp:   i64,
}

/// 資格情報発行トレイト
pub trait CredentialIssuer: Send + Sync {
    /// Identity から資格情報を発行する
    ///
    /// 有効期限は `session_expires_at` を超えない。
    fn issue(
        &self,
        identity: &Identity,
        session_expires_at: DateTime<Utc>,
    ) -> Result<BackendCredential, InfraError>;

    /// トークンを検証してクレームを返す
    fn validate(&self, token: &str) -> Result<CredentialClaims, InfraError>;
}

/// HS256 署名の JWT で資格情報を発行する
pub struct JwtCredentialIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer:       String,
    ttl:          Duration,
}

impl JwtCredentialIssuer {
    /// # エラー
    ///
    /// 署名鍵が [`MIN_SECRET_BYTES`] 未満の場合は `InfraErrorKind::Credential`。
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Result<Self, InfraError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(InfraError::credential(format!(
                "署名鍵は {MIN_SECRET_BYTES} バイト以上必要です"
            )));
        }
        if ttl <= Duration::zero() {
            return Err(InfraError::credential("有効期限は正の値である必要があります"));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;
        validation
    }
}

impl fmt::Debug for JwtCredentialIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtCredentialIssuer")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CredentialIssuer for JwtCredentialIssuer {
    fn issue(
        &self,
        identity: &Identity,
        session_expires_at: DateTime<Utc>,
    ) -> Result<BackendCredential, InfraError> {
        let now = Utc::now();
        let expires_at = (now + self.ttl).min(session_expires_at);
        if expires_at <= now {
            return Err(InfraError::credential("セッションの有効期限が切れています"));
        }

        let claims = CredentialClaims {
            iss:   self.issuer.clone(),
            sub:   identity.username().as_str().to_string(),
            uid:   identity.user_id().to_string(),
            roles: identity
                .roles()
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            iat:   now.timestamp(),
            exp:   expires_at.timestamp(),
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?;

        Ok(BackendCredential::new(token, expires_at))
    }

    fn validate(&self, token: &str) -> Result<CredentialClaims, InfraError> {
        let data = jsonwebtoken::decode::<CredentialClaims>(
            token,
            &self.decoding_key,
            &self.validation(),
        )?;
        Ok(data.claims)
    }
}

/// セッションと資格情報の紐付けを管理する
#[derive(Clone)]
pub struct CredentialVault {
    sessions: Arc<dyn SessionManager>,
    issuer:   Arc<dyn CredentialIssuer>,
}

impl CredentialVault {
    pub fn new(sessions: Arc<dyn SessionManager>, issuer: Arc<dyn CredentialIssuer>) -> Self {
        Self { sessions, issuer }
    }

    /// ログイン時にセッションへ資格情報を紐付ける
    ///
    /// # エラー
    ///
    /// セッションが既に削除されている場合は `InfraErrorKind::SessionNotFound`。
    pub async fn bind(
        &self,
        session_id: &str,
        session: &SessionData,
    ) -> Result<BackendCredential, InfraError> {
        let credential = self
            .issuer
            .issue(&session.identity(), session.expires_at())?;
        self.sessions
            .store_credential(session_id, &credential)
            .await?;

        tracing::debug!(
            user.username = %session.username(),
            credential.expires_at = %credential.expires_at(),
            "資格情報をセッションに紐付けました"
        );

        Ok(credential)
    }

    /// セッション ID から資格情報を取得する
    ///
    /// セッションが存在しない場合は `None`。資格情報の扱いは [`Self::lookup_in`] と同じ。
    pub async fn lookup(&self, session_id: &str) -> Result<Option<BackendCredential>, InfraError> {
        let Some(snapshot) = self.sessions.snapshot(session_id).await? else {
            return Ok(None);
        };
        self.lookup_in(&snapshot).await
    }

    /// リクエスト受信時のスナップショットから資格情報を取り出す
    ///
    /// 資格情報がない、または期限切れの場合は、セッションが有効な限り再発行して保存する。
    /// 保存はセッションが存在することを条件に行うため、
    /// 並行するログアウトで削除されたセッションには資格情報が戻らず `None` になる。
    pub async fn lookup_in(
        &self,
        snapshot: &SessionSnapshot,
    ) -> Result<Option<BackendCredential>, InfraError> {
        let now = Utc::now();
        if let Some(credential) = snapshot
            .credential()
            .filter(|credential| !credential.is_expired_at(now))
        {
            return Ok(Some(credential.clone()));
        }
        if snapshot.data().is_expired_at(now) {
            return Ok(None);
        }

        match self.bind(snapshot.session_id(), snapshot.data()).await {
            Ok(credential) => {
                tracing::info!(
                    user.username = %snapshot.data().username(),
                    "期限切れの資格情報を再発行しました"
                );
                Ok(Some(credential))
            }
            Err(e) if e.is_session_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}
