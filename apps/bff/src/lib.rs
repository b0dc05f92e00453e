//! # Bastion ゲートウェイ
//!
//! ブラウザ向け SPA と上流 API の間に立つ BFF（Backend for Frontend）。
//!
//! ## 責務
//!
//! - **Origin 検証**: 許可リストにないオリジンからのリクエストを最初に拒否
//! - **セッション管理**: HttpOnly Cookie によるセッションと、それに紐づく資格情報の保管
//! - **CSRF 防御**: 状態変更リクエストを Synchronizer Token で保護
//! - **リソース認可**: 上流からロードしたリソースの所有者とロールで変更可否を判断
//! - **転送**: ゲートウェイが発行した資格情報を付けて上流へ転送
//!
//! ## モジュール構成
//!
//! - `app_builder`: ルーターとミドルウェアの組み立て
//! - `client`: 外部 API クライアント（認証サービス・リソース API・転送）
//! - `config`: 環境変数からの設定読み込み
//! - `error`: ゲートウェイエラーと HTTP レスポンスへの変換
//! - `handler`: HTTP ハンドラ
//! - `middleware`: Origin 検証・セッション取得・CSRF 検証など
//! - `origin`: Origin 許可リスト

pub mod app_builder;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod origin;

pub use app_builder::{AppDependencies, build_app};
pub use config::BffConfig;
