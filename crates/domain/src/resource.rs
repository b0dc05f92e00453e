//! # 所有者を持つリソース
//!
//! ゲートウェイはリソースを所有しない。外部のリソースストアからロードされた
//! 具体的なオブジェクトの `owner` 属性を読み取るだけで、変更は一切しない。

use crate::user::Username;

/// 所有者属性を持つリソース
///
/// `owner()` は作成者のユーザー名を返す。戻り値の型を [`Username`] に固定することで、
/// 所有者比較が同じ種類の識別子同士でしか行えないようにしている。
pub trait OwnedResource: Send + Sync {
    /// リソース ID（ログ出力用）
    fn resource_id(&self) -> &str;

    /// 作成者のユーザー名
    fn owner(&self) -> &Username;
}
