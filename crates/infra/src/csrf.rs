//! # CSRF トークン生成

use rand::RngCore;

/// CSRF トークンのバイト長（256 ビット）
pub const CSRF_TOKEN_BYTES: usize = 32;

/// 暗号論的に安全な乱数から CSRF トークンを生成する
///
/// 32 バイトの乱数を 16 進数文字列（64 文字）にエンコードして返す。
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; CSRF_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
