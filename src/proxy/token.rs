//! Opaque proxy tokens
//!
//! A token is `base64url_nopad("{session_id}|{absolute_url}")`. It is safe in
//! a single URL path segment and decodes deterministically back to its
//! inputs. Nothing is encrypted: possession of the session id is the
//! capability, and the upstream URL is not a secret.

use crate::{Error, Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

/// Separator between session id and URL inside the decoded payload
pub const SEPARATOR: char = '|';

/// A decoded `(session id, upstream URL)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyToken {
    /// Session the request is bound to
    pub session_id: String,
    /// Absolute upstream URL
    pub url: String,
}

impl ProxyToken {
    /// Create a token value for a session and upstream URL
    pub fn new(session_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            url: url.into(),
        }
    }

    /// Encode into the path-safe wire format
    pub fn encode(&self) -> String {
        encode(&self.session_id, &self.url)
    }

    /// Decode a token taken from a request path
    pub fn decode(token: &str) -> Result<Self> {
        let (session_id, url) = decode(token)?;
        Ok(Self { session_id, url })
    }
}

/// Pack a session id and URL into a token
pub fn encode(session_id: &str, url: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}{}{}", session_id, SEPARATOR, url))
}

/// Unpack a token into `(session_id, url)`
///
/// Trailing `=` padding is tolerated so tokens copied from padded encoders
/// still resolve.
pub fn decode(token: &str) -> Result<(String, String)> {
    let raw = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|e| Error::invalid_token(format!("base64: {}", e)))?;
    let payload =
        String::from_utf8(raw).map_err(|_| Error::invalid_token("payload is not UTF-8"))?;

    // session ids never contain the separator, so the first one splits
    let (session_id, url) = payload
        .split_once(SEPARATOR)
        .ok_or_else(|| Error::invalid_token("missing separator"))?;

    if session_id.is_empty() || url.is_empty() {
        return Err(Error::invalid_token("empty session id or url"));
    }

    Ok((session_id.to_string(), url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn is_path_safe(token: &str) -> bool {
        !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    #[rstest]
    #[case("https://cdn.example/path/index.m3u8")]
    #[case("https://cdn.example/seg.ts?token=a&b=c%2Fd")]
    #[case("https://h/a/b/?x=1&y=%3F%26/&z=|pipe")]
    #[case("http://[::1]:8080/live/playlist.m3u8#frag")]
    fn test_roundtrip_reserved_characters(#[case] url: &str) {
        let session_id = "0f1e2d3c4b5a69788796a5b4c3d2e1f0";
        let token = encode(session_id, url);
        assert!(is_path_safe(&token), "token not path safe: {}", token);
        assert_eq!(
            decode(&token).unwrap(),
            (session_id.to_string(), url.to_string())
        );
    }

    #[test]
    fn test_wire_format() {
        let token = encode("abc", "https://h/x");
        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        assert_eq!(String::from_utf8(raw).unwrap(), "abc|https://h/x");
        assert!(!token.contains('='));
    }

    #[test]
    fn test_padded_token_still_decodes() {
        let token = format!("{}==", encode("abc", "https://h/x"));
        assert_eq!(decode(&token).unwrap().0, "abc");
    }

    #[test]
    fn test_missing_separator_is_invalid() {
        let token = URL_SAFE_NO_PAD.encode("no-separator-here");
        let err = decode(&token).unwrap_err();
        assert!(matches!(err, Error::InvalidToken { .. }));
    }

    #[rstest]
    #[case("not base64 !!")]
    #[case("")]
    fn test_undecodable_is_invalid(#[case] token: &str) {
        assert!(matches!(
            decode(token).unwrap_err(),
            Error::InvalidToken { .. }
        ));
    }

    #[test]
    fn test_struct_roundtrip() {
        let token = ProxyToken::new("sid", "https://h/a.ts");
        assert_eq!(ProxyToken::decode(&token.encode()).unwrap(), token);
    }
}
