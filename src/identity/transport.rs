//! Session transport: the one place that knows how tokens travel.
//!
//! The current carrier is a named cookie. Swapping to a header means changing
//! this module only; nothing else reads or writes the carrier.

use axum::http::{HeaderMap, HeaderValue};

/// Extracts the raw token from requests and attaches refreshed tokens to
/// responses through the configured cookie.
#[derive(Debug, Clone)]
pub struct TokenTransport {
    cookie_name: String,
}

impl TokenTransport {
    pub fn new<S: Into<String>>(cookie_name: S) -> Self {
        Self { cookie_name: cookie_name.into() }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Read the raw token from the request cookie header, if present.
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
        let s = cookie.to_str().ok()?;
        for part in s.split(';') {
            let p = part.trim();
            if let Some(eq) = p.find('=') {
                let (k, v) = p.split_at(eq);
                if k == self.cookie_name {
                    return Some(v[1..].to_string());
                }
            }
        }
        None
    }

    /// Set the carrier cookie on an outgoing response.
    /// HttpOnly cookie scoped to path / with SameSite=Strict.
    pub fn attach(&self, headers: &mut HeaderMap, token: &str) {
        let v = format!("{}={}; HttpOnly; SameSite=Strict; Path=/", self.cookie_name, token);
        if let Ok(hv) = HeaderValue::from_str(&v) {
            headers.append("Set-Cookie", hv);
        }
    }

    /// Expire the carrier cookie so the client discards its token.
    pub fn clear(&self, headers: &mut HeaderMap) {
        let v = format!(
            "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict; Path=/",
            self.cookie_name
        );
        if let Ok(hv) = HeaderValue::from_str(&v) {
            headers.append("Set-Cookie", hv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_finds_named_cookie_among_others() {
        let t = TokenTransport::new("JWT");
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("theme=dark; JWT=abc.def.ghi; lang=en"));
        assert_eq!(t.extract(&h).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn extract_absent_when_no_cookie() {
        let t = TokenTransport::new("JWT");
        let h = HeaderMap::new();
        assert!(t.extract(&h).is_none());
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("other=1"));
        assert!(t.extract(&h).is_none());
    }

    #[test]
    fn attach_then_extract_round_trips() {
        let t = TokenTransport::new("JWT");
        let mut out = HeaderMap::new();
        t.attach(&mut out, "tok123");
        let set = out.get("Set-Cookie").unwrap().to_str().unwrap().to_string();
        assert!(set.starts_with("JWT=tok123;"));

        // Simulate the client echoing the cookie back
        let cookie_pair = set.split(';').next().unwrap().to_string();
        let mut next = HeaderMap::new();
        next.insert("cookie", HeaderValue::from_str(&cookie_pair).unwrap());
        assert_eq!(t.extract(&next).as_deref(), Some("tok123"));
    }

    #[test]
    fn carrier_name_is_configurable() {
        let t = TokenTransport::new("session");
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("JWT=nope; session=yes"));
        assert_eq!(t.extract(&h).as_deref(), Some("yes"));
    }
}
