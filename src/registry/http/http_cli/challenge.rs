use http::Uri;
use regex::Regex;

use crate::error::RetagError;

/// The parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerConfig {
    pub realm: Uri,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl std::fmt::Display for BearerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ realm: {}, service: {}, scope: {} }}",
            self.realm,
            self.service.as_deref().unwrap_or(""),
            self.scope.as_deref().unwrap_or("")
        )
    }
}

impl BearerConfig {
    /// Parses the auth-params of a bearer challenge. Keys are matched case
    /// insensitively and in any order, values may be quoted (with `\"`
    /// escapes, commas allowed inside) or bare tokens. Unknown keys are
    /// ignored; only `realm` is mandatory.
    pub fn from_auth_header(auth_header: &str) -> Result<Self, RetagError> {
        let fail = |reason: String| RetagError::AuthChallengeParse {
            header: auth_header.to_string(),
            reason,
        };

        let trimmed = auth_header.trim();
        let (scheme, params) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(fail(format!("unsupported auth scheme '{}'", scheme)));
        }

        // key="quoted, value" | key=token
        let pair_regex =
            Regex::new(r#"([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^,\s"]*))"#)
                .map_err(|e| fail(e.to_string()))?;

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for captures in pair_regex.captures_iter(params) {
            let value = match (captures.get(2), captures.get(3)) {
                (Some(quoted), _) => unescape(quoted.as_str()),
                (None, Some(bare)) => bare.as_str().to_string(),
                (None, None) => String::new(),
            };
            match captures[1].to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value).filter(|s| !s.is_empty()),
                "scope" => scope = Some(value).filter(|s| !s.is_empty()),
                _ => (),
            }
        }

        let realm = realm.ok_or_else(|| fail("missing realm".to_string()))?;
        let realm: Uri = realm
            .parse()
            .map_err(|e| fail(format!("realm '{}' is not a valid uri: {}", realm, e)))?;
        if realm.scheme().is_none() || realm.host().is_none() {
            return Err(fail(format!("realm '{}' is not an absolute uri", realm)));
        }

        Ok(BearerConfig {
            realm,
            service,
            scope,
        })
    }
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
