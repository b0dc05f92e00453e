//! # API レスポンスエンベロープ
//!
//! ゲートウェイ自身が返すレスポンスの統一形式 `{ "data": T }` を提供する。
//! 上流 API から中継したレスポンスはこの形式に包み直さない。

use serde::{Deserialize, Serialize};

/// ゲートウェイ API の統一レスポンス型
///
/// ## 使用例
///
/// ```
/// use bastion_shared::ApiResponse;
///
/// let response = ApiResponse::new("hello");
/// assert_eq!(response.data, "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// 新しい `ApiResponse` を作成する
    pub fn new(data: T) -> Self {
        Self { data }
    }
}
