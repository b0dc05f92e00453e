//! # ドメイン層エラー定義
//!
//! ## エラーの種類と扱い
//!
//! | エラー種別 | 発生タイミング | 扱い |
//! |-----------|----------------|------|
//! | `Validation` | 値オブジェクト生成時 | 400 Bad Request |
//! | `UnknownPolicy` | ポリシー解決時 | 起動時検証で検出し、プロセスを起動しない |

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値がビジネスルールに違反している場合に使用する。
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// 未登録のポリシー名が指定された
    ///
    /// 設定不備であり、実行時の 500 ではなく起動時に検出されるべきもの。
    #[error("ポリシーが登録されていません: {0}")]
    UnknownPolicy(String),
}
