//! # BFF 設定
//!
//! 環境変数から BFF サーバーの設定を読み込む。
//!
//! 値の解釈は [`BffConfig::from_lookup`] に集約し、テストでは環境変数を
//! 書き換えずにクロージャで値を与える。

use std::{env, fmt};

use chrono::Duration;
use thiserror::Error;

use crate::origin::{OriginAllowlist, OriginRuleError};

/// 署名鍵の最小バイト長
const MIN_SIGNING_SECRET_BYTES: usize = 32;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    /// 値の形式が不正
    #[error("{name} の値が不正です: {reason}")]
    Invalid { name: &'static str, reason: String },

    /// Origin 許可リストの書式が不正
    #[error("ALLOWED_ORIGINS の値が不正です: {0}")]
    Origin(#[from] OriginRuleError),
}

/// BFF サーバーの設定
///
/// `Debug` 出力には署名鍵を含めない。
#[derive(Clone)]
pub struct BffConfig {
    /// バインドアドレス
    pub host: String,
    /// ポート番号
    pub port: u16,
    /// Redis 接続 URL（未設定の場合はインメモリストア）
    pub redis_url: Option<String>,
    /// リソース API の URL
    pub upstream_url: String,
    /// 認証サービスの URL
    pub auth_url: String,
    /// Origin 許可リスト
    pub allowed_origins: OriginAllowlist,
    /// CSRF 検証対象のパスプレフィックス
    pub csrf_protected_prefixes: Vec<String>,
    /// バックエンド資格情報の署名鍵
    pub credential_signing_secret: String,
    /// バックエンド資格情報の有効期限
    pub credential_ttl: Duration,
    /// セッションの有効期限
    pub session_ttl: Duration,
    /// 上流呼び出しのタイムアウト
    pub upstream_timeout: std::time::Duration,
    /// 転送するリクエストボディの上限（バイト）
    pub max_body_bytes: usize,
    /// 転送時に取り除くパスプレフィックス
    pub upstream_strip_prefix: String,
    /// Cookie に Secure 属性を付与するか
    pub cookie_secure: bool,
    /// 認可拒否を 404 として返すか
    pub hide_forbidden_resources: bool,
}

impl BffConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の値取得関数から設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let credential_signing_secret = required("CREDENTIAL_SIGNING_SECRET")?;
        if credential_signing_secret.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(ConfigError::Invalid {
                name:   "CREDENTIAL_SIGNING_SECRET",
                reason: format!("{MIN_SIGNING_SECRET_BYTES} バイト以上必要です"),
            });
        }

        let allowed_origins = OriginAllowlist::parse(split_list(&required("ALLOWED_ORIGINS")?))?;

        let csrf_protected_prefixes = lookup("CSRF_PROTECTED_PREFIXES")
            .map(|v| split_list(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec!["/api/".to_string()]);

        Ok(Self {
            host: lookup("BFF_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse("BFF_PORT", &required("BFF_PORT")?)?,
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            upstream_url: required("UPSTREAM_URL")?,
            auth_url: required("AUTH_URL")?,
            allowed_origins,
            csrf_protected_prefixes,
            credential_signing_secret,
            credential_ttl: Duration::seconds(positive(
                "CREDENTIAL_TTL_SECONDS",
                lookup("CREDENTIAL_TTL_SECONDS"),
                900,
            )?),
            session_ttl: Duration::seconds(positive(
                "SESSION_TTL_SECONDS",
                lookup("SESSION_TTL_SECONDS"),
                28800,
            )?),
            upstream_timeout: std::time::Duration::from_secs(
                positive(
                    "UPSTREAM_TIMEOUT_SECONDS",
                    lookup("UPSTREAM_TIMEOUT_SECONDS"),
                    10,
                )?
                .unsigned_abs(),
            ),
            max_body_bytes: lookup("MAX_BODY_BYTES")
                .map(|v| parse("MAX_BODY_BYTES", &v))
                .transpose()?
                .unwrap_or(2 * 1024 * 1024),
            upstream_strip_prefix: lookup("UPSTREAM_STRIP_PREFIX")
                .unwrap_or_else(|| "/api".to_string()),
            cookie_secure: lookup("COOKIE_SECURE")
                .map(|v| parse_bool("COOKIE_SECURE", &v))
                .transpose()?
                .unwrap_or(true),
            hide_forbidden_resources: lookup("HIDE_FORBIDDEN_RESOURCES")
                .map(|v| parse_bool("HIDE_FORBIDDEN_RESOURCES", &v))
                .transpose()?
                .unwrap_or(false),
        })
    }
}

impl fmt::Debug for BffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BffConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[SET]"))
            .field("upstream_url", &self.upstream_url)
            .field("auth_url", &self.auth_url)
            .field("allowed_origins", &self.allowed_origins)
            .field("csrf_protected_prefixes", &self.csrf_protected_prefixes)
            .field("credential_ttl", &self.credential_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("upstream_strip_prefix", &self.upstream_strip_prefix)
            .field("cookie_secure", &self.cookie_secure)
            .field("hide_forbidden_resources", &self.hide_forbidden_resources)
            .finish_non_exhaustive()
    }
}

/// カンマ区切りのリストを分割する（空要素は除く）
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn positive(name: &'static str, value: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed: i64 = parse(name, &value)?;
    if parsed <= 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "正の値である必要があります".to_string(),
        });
    }
    Ok(parsed)
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("true / false のいずれかを指定してください: {other}"),
        }),
    }
}
