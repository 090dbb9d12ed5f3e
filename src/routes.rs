use crate::error::ProxyError;
use http::Method;

/// Prefix every proxied route lives under.
pub const API_PREFIX: &str = "/api/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    GetIssue(u64),
    EditIssue(u64),
    ListIssues,
    ListPrivate,
    Search,
    RepoLabels,
    Category(String),
    Comments(u64),
    ModifyLabels(u64),
    UserActivity { username: String, parameter: String },
}

impl Route {
    /// Matches a request path against the route table. Literal and
    /// integer segments take precedence over the free `{user}/{parameter}`
    /// template. A path that only matches with another method yields
    /// `MethodNotAllowed`. Segments are percent-decoded after splitting,
    /// so an encoded `/` stays inside its segment.
    pub fn resolve(method: &Method, path: &str) -> Result<Route, ProxyError> {
        let rest = path.strip_prefix(API_PREFIX).ok_or(ProxyError::NotFound)?;
        let decoded = rest
            .split('/')
            .map(|s| match urlencoding::decode(s) {
                Ok(d) if !d.is_empty() => Ok(d.into_owned()),
                _ => Err(ProxyError::NotFound),
            })
            .collect::<Result<Vec<String>, _>>()?;
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

        let is_get = *method == Method::GET || *method == Method::HEAD;
        let is = |m: Method| *method == m;
        // (route, allowed) in precedence order
        let candidates: Vec<(Route, bool)> = match segments.as_slice() {
            ["issues"] => vec![(Route::ListIssues, is_get)],
            ["private"] => vec![(Route::ListPrivate, is_get)],
            ["issues", "search"] => vec![(Route::Search, is_get)],
            ["issues", "labels"] => vec![(Route::RepoLabels, is_get)],
            ["issues", number] => match parse_number(number) {
                Some(n) => vec![(Route::GetIssue(n), is_get)],
                None => vec![],
            },
            ["issues", "category", category] => {
                vec![(Route::Category(category.to_string()), is_get)]
            }
            ["issues", first, second] => {
                let mut v = Vec::new();
                if let Some(n) = parse_number(first) {
                    match *second {
                        "edit" => v.push((Route::EditIssue(n), is(Method::PATCH))),
                        "comments" => {
                            v.push((Route::Comments(n), is_get || is(Method::POST)))
                        }
                        "labels" => v.push((Route::ModifyLabels(n), is(Method::POST))),
                        _ => {}
                    }
                }
                v.push((
                    Route::UserActivity {
                        username: first.to_string(),
                        parameter: second.to_string(),
                    },
                    is_get,
                ));
                v
            }
            _ => vec![],
        };

        if candidates.is_empty() {
            return Err(ProxyError::NotFound);
        }
        candidates
            .into_iter()
            .find(|(_, allowed)| *allowed)
            .map(|(route, _)| route)
            .ok_or(ProxyError::MethodNotAllowed)
    }
}

/// Unsigned decimal digits only, like the `int` path converter.
fn parse_number(segment: &str) -> Option<u64> {
    if segment.bytes().all(|b| b.is_ascii_digit()) {
        segment.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> Result<Route, ProxyError> {
        Route::resolve(&Method::GET, path)
    }

    #[test]
    fn literal_routes() {
        assert_eq!(get("/api/issues"), Ok(Route::ListIssues));
        assert_eq!(get("/api/private"), Ok(Route::ListPrivate));
        assert_eq!(get("/api/issues/search"), Ok(Route::Search));
        assert_eq!(get("/api/issues/labels"), Ok(Route::RepoLabels));
        assert_eq!(get("/api/issues/category/needsdiagnosis"), Ok(Route::Category("needsdiagnosis".into())));
    }

    #[test]
    fn numeric_routes() {
        assert_eq!(get("/api/issues/42"), Ok(Route::GetIssue(42)));
        assert_eq!(get("/api/issues/42/comments"), Ok(Route::Comments(42)));
        assert_eq!(
            Route::resolve(&Method::POST, "/api/issues/42/comments"),
            Ok(Route::Comments(42))
        );
        assert_eq!(
            Route::resolve(&Method::PATCH, "/api/issues/42/edit"),
            Ok(Route::EditIssue(42))
        );
        assert_eq!(
            Route::resolve(&Method::POST, "/api/issues/42/labels"),
            Ok(Route::ModifyLabels(42))
        );
        assert_eq!(get("/api/issues/-1"), Err(ProxyError::NotFound));
        assert_eq!(get("/api/issues/abc"), Err(ProxyError::NotFound));
    }

    #[test]
    fn user_activity_is_the_fallback() {
        assert_eq!(
            get("/api/issues/miketaylr/creator"),
            Ok(Route::UserActivity {
                username: "miketaylr".into(),
                parameter: "creator".into()
            })
        );
        // GET on the labels-modify path falls through to the free template
        assert_eq!(
            get("/api/issues/42/labels"),
            Ok(Route::UserActivity {
                username: "42".into(),
                parameter: "labels".into()
            })
        );
    }

    #[test]
    fn wrong_method_and_unknown_paths() {
        assert_eq!(
            Route::resolve(&Method::GET, "/api/issues/42/edit"),
            Ok(Route::UserActivity {
                username: "42".into(),
                parameter: "edit".into()
            })
        );
        assert_eq!(
            Route::resolve(&Method::DELETE, "/api/issues/42/edit"),
            Err(ProxyError::MethodNotAllowed)
        );
        assert_eq!(
            Route::resolve(&Method::POST, "/api/issues"),
            Err(ProxyError::MethodNotAllowed)
        );
        assert_eq!(get("/api/issues/"), Err(ProxyError::NotFound));
        assert_eq!(get("/issues"), Err(ProxyError::NotFound));
        assert_eq!(get("/api/issues/1/2/3"), Err(ProxyError::NotFound));
    }

    #[test]
    fn segments_are_percent_decoded() {
        assert_eq!(
            get("/api/issues/a%2Db/creator"),
            Ok(Route::UserActivity {
                username: "a-b".into(),
                parameter: "creator".into()
            })
        );
        assert_eq!(
            get("/api/issues/category/needs%20diagnosis"),
            Ok(Route::Category("needs diagnosis".into()))
        );
        assert_eq!(get("/api/issues/%34%32"), Ok(Route::GetIssue(42)));
        assert_eq!(get("/api/issues/%6Cabels"), Ok(Route::RepoLabels));
        assert_eq!(
            get("/api/issues/a%2Fb/creator"),
            Ok(Route::UserActivity {
                username: "a/b".into(),
                parameter: "creator".into()
            })
        );
        // not UTF-8 once decoded
        assert_eq!(get("/api/issues/%FF/creator"), Err(ProxyError::NotFound));
    }

    #[test]
    fn head_is_treated_as_get() {
        assert_eq!(Route::resolve(&Method::HEAD, "/api/issues/7"), Ok(Route::GetIssue(7)));
    }
}
