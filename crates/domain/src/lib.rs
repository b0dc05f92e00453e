//! # Bastion ドメイン層
//!
//! ゲートウェイの認可判断の中核を担うドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **純粋性**: I/O を一切行わない。リソースのロードや削除は呼び出し側の責務
//! - **型による識別子の区別**: 所有者比較に使う識別子は [`user::Username`] に限定し、
//!   表示名や数値 ID との取り違えをコンパイル時に防ぐ
//! - **明示的な初期化**: ポリシーはプロセス起動時に一度だけ構築し、
//!   参照として各リクエストに渡す（グローバルな可変レジストリは持たない）
//!
//! ## 依存関係の方向
//!
//! ```text
//! bff → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`error`] - ドメイン層で発生するエラーの定義
//! - [`user`] - ユーザー識別子（`UserId`, `Username`）
//! - [`role`] - ロール
//! - [`identity`] - 認証済みの主体
//! - [`resource`] - 所有者を持つリソースの抽象
//! - [`authorization`] - リソースベース認可エンジン
//! - [`policy`] - ポリシーレジストリ

pub mod authorization;
pub mod error;
pub mod identity;
pub mod policy;
pub mod resource;
pub mod role;
pub mod user;

pub use error::DomainError;
