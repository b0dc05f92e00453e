//! # Origin 許可リスト
//!
//! リクエストの `Origin` が資格情報付きレスポンスを受け取ってよいかを判定する。
//!
//! ## ルールの書式
//!
//! | 書式 | 例 | 一致する Origin |
//! |-----|-----|----------------|
//! | 完全一致 | `http://localhost:4200` | `http://localhost:4200` のみ |
//! | サブドメイン | `https://*.example.com` | `https://app.example.com` 等（既定ポートのみ） |
//!
//! 比較前に scheme / host の小文字化と既定ポートの省略で正規化する。
//! 文字列の前方一致は使わない（`http://localhost` がポート違いの
//! 任意のオリジンを許可してしまうため）。

use thiserror::Error;
use url::Url;

/// 許可リストのルール書式エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginRuleError {
    #[error("Origin として解釈できません: {0}")]
    Malformed(String),

    #[error("scheme は http または https である必要があります: {0}")]
    UnsupportedScheme(String),

    #[error("Origin にパス・クエリ・認証情報は含められません: {0}")]
    NotAnOrigin(String),

    #[error("ワイルドカードは先頭のサブドメインにのみ指定できます: {0}")]
    InvalidWildcard(String),

    #[error("許可リストが空です")]
    Empty,
}

/// 許可ルール
#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginRule {
    /// 正規化済みの Origin（例: `http://localhost:4200`）
    Exact(String),
    /// scheme と、`.` から始まるホスト名サフィックス
    Subdomain { scheme: String, suffix: String },
}

/// 正規化済みの Origin
#[derive(Debug, Clone, PartialEq, Eq)]
struct NormalizedOrigin {
    scheme:       String,
    host:         String,
    default_port: bool,
    serialized:   String,
}

impl NormalizedOrigin {
    fn parse(raw: &str) -> Result<Self, OriginRuleError> {
        let url = Url::parse(raw.trim()).map_err(|_| OriginRuleError::Malformed(raw.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(OriginRuleError::UnsupportedScheme(raw.to_string()));
        }
        if url.path() != "/"
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
            || url.password().is_some()
        {
            return Err(OriginRuleError::NotAnOrigin(raw.to_string()));
        }

        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(OriginRuleError::Malformed(raw.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| OriginRuleError::Malformed(raw.to_string()))?;

        Ok(Self {
            scheme:       url.scheme().to_string(),
            host:         host.to_string(),
            default_port: url.port().is_none(),
            serialized:   origin.ascii_serialization(),
        })
    }
}

/// Origin 許可リスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAllowlist {
    rules: Vec<OriginRule>,
}

impl OriginAllowlist {
    /// ルールの一覧から許可リストを構築する
    ///
    /// # エラー
    ///
    /// いずれかのルールが書式に合わない場合、または一覧が空の場合。
    pub fn parse<I, S>(entries: I) -> Result<Self, OriginRuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = entries
            .into_iter()
            .map(|entry| parse_rule(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        if rules.is_empty() {
            return Err(OriginRuleError::Empty);
        }
        Ok(Self { rules })
    }

    /// Origin ヘッダーの値が許可されているか
    ///
    /// 解釈できない値（`null` を含む）は常に拒否する。
    pub fn is_allowed(&self, origin: &str) -> bool {
        let Ok(candidate) = NormalizedOrigin::parse(origin) else {
            return false;
        };

        self.rules.iter().any(|rule| match rule {
            OriginRule::Exact(allowed) => *allowed == candidate.serialized,
            OriginRule::Subdomain { scheme, suffix } => {
                *scheme == candidate.scheme
                    && candidate.default_port
                    && candidate.host.len() > suffix.len()
                    && candidate.host.ends_with(suffix.as_str())
            }
        })
    }
}

fn parse_rule(entry: &str) -> Result<OriginRule, OriginRuleError> {
    let entry = entry.trim();

    if !entry.contains('*') {
        return NormalizedOrigin::parse(entry).map(|origin| OriginRule::Exact(origin.serialized));
    }

    let (scheme, rest) = entry
        .split_once("://")
        .ok_or_else(|| OriginRuleError::Malformed(entry.to_string()))?;
    let domain = rest
        .strip_prefix("*.")
        .filter(|domain| !domain.contains('*'))
        .ok_or_else(|| OriginRuleError::InvalidWildcard(entry.to_string()))?;

    let base = NormalizedOrigin::parse(&format!("{scheme}://{domain}"))?;
    if !base.default_port || base.host.parse::<std::net::IpAddr>().is_ok() || base.host.starts_with('[')
    {
        return Err(OriginRuleError::InvalidWildcard(entry.to_string()));
    }

    Ok(OriginRule::Subdomain {
        scheme: base.scheme,
        suffix: format!(".{}", base.host),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn allowlist(entries: &[&str]) -> OriginAllowlist {
        OriginAllowlist::parse(entries).unwrap()
    }

    #[rstest]
    #[case("http://localhost:4200", true)]
    #[case("http://evil.example:8888", false)]
    #[case("http://localhost:9999", false)]
    #[case("http://localhost", false)]
    #[case("https://localhost:4200", false)]
    #[case("http://localhost:42000", false)]
    #[case("http://localhost:4200.evil.example", false)]
    #[case("null", false)]
    #[case("", false)]
    fn test_完全一致ルール(#[case] origin: &str, #[case] expected: bool) {
        let sut = allowlist(&["http://localhost:4200"]);

        assert_eq!(sut.is_allowed(origin), expected);
    }

    #[test]
    fn test_大文字と既定ポートは正規化して比較される() {
        let sut = allowlist(&["HTTPS://App.Example.COM:443"]);

        assert!(sut.is_allowed("https://app.example.com"));
        assert!(sut.is_allowed("https://APP.example.com:443"));
        assert!(!sut.is_allowed("https://app.example.com:8443"));
    }

    #[rstest]
    #[case("https://app.example.com", true)]
    #[case("https://a.b.example.com", true)]
    #[case("https://example.com", false)]
    #[case("https://evilexample.com", false)]
    #[case("http://app.example.com", false)]
    #[case("https://app.example.com:8443", false)]
    #[case("https://app.example.com.evil.test", false)]
    fn test_サブドメインルール(#[case] origin: &str, #[case] expected: bool) {
        let sut = allowlist(&["https://*.example.com"]);

        assert_eq!(sut.is_allowed(origin), expected);
    }

    #[test]
    fn test_複数ルールのいずれかに一致すれば許可される() {
        let sut = allowlist(&["http://localhost:4200", "https://*.example.com"]);

        assert!(sut.is_allowed("http://localhost:4200"));
        assert!(sut.is_allowed("https://www.example.com"));
        assert!(!sut.is_allowed("http://localhost:3000"));
    }

    #[rstest]
    #[case("localhost:4200")]
    #[case("ftp://files.example.com")]
    #[case("http://localhost:4200/app")]
    #[case("http://user@localhost:4200")]
    #[case("http://*localhost")]
    #[case("https://*.*.example.com")]
    #[case("https://app.*.example.com")]
    #[case("https://*.example.com:8443")]
    #[case("http://*.127.0.0.1")]
    fn test_不正なルールは拒否される(#[case] entry: &str) {
        assert!(OriginAllowlist::parse([entry]).is_err(), "{entry}");
    }

    #[test]
    fn test_空の許可リストはエラー() {
        let entries: [&str; 0] = [];

        assert_eq!(OriginAllowlist::parse(entries), Err(OriginRuleError::Empty));
    }
}
