//! # ヘルスチェック共通型
//!
//! Liveness / Readiness エンドポイントのレスポンス型。
//! Readiness の全体ステータスは個別チェックから [`ReadinessResponse::from_checks`] で導出する。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Liveness レスポンス
///
/// ```
/// use bastion_shared::HealthResponse;
///
/// let response = HealthResponse::healthy("0.1.0");
/// assert_eq!(response.status, "healthy");
/// ```
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 稼働状態
    pub status:  String,
    /// アプリケーションバージョン（Cargo.toml から取得）
    pub version: String,
}

impl HealthResponse {
    pub fn healthy(version: impl Into<String>) -> Self {
        Self {
            status:  "healthy".to_string(),
            version: version.into(),
        }
    }
}

/// 個別チェックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
}

/// Readiness 全体のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// 全チェックが OK
    Ready,
    /// 1 つ以上のチェックが失敗
    NotReady,
}

/// Readiness レスポンス
///
/// `checks` はチェック名の昇順で直列化される。
///
/// ```
/// use bastion_shared::{CheckStatus, ReadinessResponse, ReadinessStatus};
///
/// let response = ReadinessResponse::from_checks([
///     ("session_store", CheckStatus::Ok),
///     ("upstream", CheckStatus::Error),
/// ]);
/// assert_eq!(response.status, ReadinessStatus::NotReady);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: ReadinessStatus,
    pub checks: BTreeMap<String, CheckStatus>,
}

impl ReadinessResponse {
    /// 個別チェックの結果から全体ステータスを導出する
    ///
    /// チェックが 1 つもない場合は `Ready`。
    pub fn from_checks<I, S>(checks: I) -> Self
    where
        I: IntoIterator<Item = (S, CheckStatus)>,
        S: Into<String>,
    {
        let checks: BTreeMap<String, CheckStatus> = checks
            .into_iter()
            .map(|(name, status)| (name.into(), status))
            .collect();
        let status = if checks.values().all(|s| *s == CheckStatus::Ok) {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };
        Self { status, checks }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ReadinessStatus::Ready
    }
}
