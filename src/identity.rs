use http::header::AUTHORIZATION;
use http::HeaderMap;

/// Header carrying the login of the signed-in user, set by the session layer.
pub const USER_HEADER: &str = "x-webcompat-user";

/// Bucket shared by every anonymous caller.
pub const ANONYMOUS_RATE_KEY: &str = "proxy-user";

/// Who is making the request. Passed explicitly into every dispatcher
/// operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User { login: String, token: String },
}

impl Caller {
    pub fn user(login: impl Into<String>, token: impl Into<String>) -> Self {
        Caller::User {
            login: login.into(),
            token: token.into(),
        }
    }

    /// Authenticated only when both the login header and a
    /// `token`/`Bearer` authorization are present.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let login = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.strip_prefix("token ")
                    .or_else(|| v.strip_prefix("Bearer "))
            })
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match (login, token) {
            (Some(login), Some(token)) => Caller::user(login, token),
            _ => Caller::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Caller::User { .. })
    }

    pub fn login(&self) -> Option<&str> {
        match self {
            Caller::User { login, .. } => Some(login),
            Caller::Anonymous => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Caller::User { token, .. } => Some(token),
            Caller::Anonymous => None,
        }
    }

    pub fn rate_limit_key(&self) -> &str {
        self.login().unwrap_or(ANONYMOUS_RATE_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, v.parse().unwrap());
        }
        h
    }

    #[test]
    fn needs_login_and_token() {
        let c = Caller::from_headers(&headers(&[
            ("x-webcompat-user", "miketaylr"),
            ("authorization", "token abc"),
        ]));
        assert_eq!(c, Caller::user("miketaylr", "abc"));
        assert_eq!(c.rate_limit_key(), "miketaylr");

        let c = Caller::from_headers(&headers(&[("authorization", "Bearer abc")]));
        assert_eq!(c, Caller::Anonymous);
        let c = Caller::from_headers(&headers(&[("x-webcompat-user", "someone")]));
        assert_eq!(c, Caller::Anonymous);
        let c = Caller::from_headers(&headers(&[
            ("x-webcompat-user", "someone"),
            ("authorization", "Basic Zm9vOmJhcg=="),
        ]));
        assert!(!c.is_authenticated());
    }

    #[test]
    fn anonymous_shares_bucket() {
        assert_eq!(Caller::Anonymous.rate_limit_key(), ANONYMOUS_RATE_KEY);
    }
}
