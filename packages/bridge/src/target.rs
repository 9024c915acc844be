//! Reducing request URLs to the path and query an operation sees.

use url::Url;

/// Origin relative URLs are resolved against. Only used to get `url` to
/// parse them; it never leaves this module.
const LOCAL_ORIGIN: &str = "http://localhost/";

/// Path and raw query string of a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    /// Percent-encoded path, always starting with `/`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
}

impl RequestTarget {
    /// Split `raw` into path and query.
    ///
    /// Absolute URLs are accepted only when no `base_url` is configured or
    /// when they share its origin; the base URL's own path is then stripped.
    /// Returns `None` for URLs that do not belong to the bridge.
    pub fn parse(raw: &str, base_url: Option<&Url>) -> Option<Self> {
        match Url::parse(raw) {
            Ok(absolute) => Self::from_absolute(&absolute, base_url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let local = Url::parse(LOCAL_ORIGIN).ok()?.join(raw).ok()?;
                Some(Self::from_url(&local))
            }
            Err(_) => None,
        }
    }

    fn from_absolute(url: &Url, base_url: Option<&Url>) -> Option<Self> {
        let target = Self::from_url(url);
        let Some(base) = base_url else {
            return Some(target);
        };

        if url.origin() != base.origin() {
            return None;
        }

        let base_path = base.path().trim_end_matches('/');
        let path = strip_segment_prefix(&target.path, base_path)?;
        Some(Self {
            path,
            query: target.query,
        })
    }

    fn from_url(url: &Url) -> Self {
        Self {
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
        }
    }

    /// Remove `prefix` from the path on a segment boundary.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &str) -> Option<Self> {
        let path = strip_segment_prefix(&self.path, prefix.trim_end_matches('/'))?;
        Some(Self {
            path,
            query: self.query.clone(),
        })
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        strip_segment_prefix(&self.path, prefix.trim_end_matches('/')).is_some()
    }
}

/// `/api` strips from `/api` and `/api/...` but not from `/apix`.
/// An empty remainder becomes `/`.
fn strip_segment_prefix(path: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(path: &str, query: Option<&str>) -> RequestTarget {
        RequestTarget {
            path: path.to_string(),
            query: query.map(str::to_string),
        }
    }

    #[test]
    fn relative_url_with_query() {
        assert_eq!(
            RequestTarget::parse("/api/users?page=2&q=a+b", None),
            Some(target("/api/users", Some("page=2&q=a+b")))
        );
    }

    #[test]
    fn relative_url_without_leading_slash() {
        assert_eq!(
            RequestTarget::parse("api/users", None),
            Some(target("/api/users", None))
        );
    }

    #[test]
    fn trailing_slash_preserved() {
        assert_eq!(
            RequestTarget::parse("/api/users/", None).unwrap().path,
            "/api/users/"
        );
    }

    #[test]
    fn absolute_url_without_base_keeps_path() {
        assert_eq!(
            RequestTarget::parse("https://example.com/api/users/7", None),
            Some(target("/api/users/7", None))
        );
    }

    #[test]
    fn absolute_url_must_share_base_origin() {
        let base = Url::parse("http://localhost:8000").unwrap();
        assert_eq!(
            RequestTarget::parse("http://localhost:8000/api/users", Some(&base)),
            Some(target("/api/users", None))
        );
        assert_eq!(
            RequestTarget::parse("http://localhost:9000/api/users", Some(&base)),
            None
        );
    }

    #[test]
    fn base_path_stripped() {
        let base = Url::parse("http://localhost:8000/app/").unwrap();
        assert_eq!(
            RequestTarget::parse("http://localhost:8000/app/api/users", Some(&base)),
            Some(target("/api/users", None))
        );
        assert_eq!(
            RequestTarget::parse("http://localhost:8000/other/api", Some(&base)),
            None
        );
    }

    #[test]
    fn prefix_stripped_on_segment_boundary() {
        let t = target("/api/users/7", Some("x=1"));
        assert_eq!(t.strip_prefix("/api"), Some(target("/users/7", Some("x=1"))));
        assert_eq!(t.strip_prefix("/api/"), Some(target("/users/7", Some("x=1"))));
        assert_eq!(target("/api", None).strip_prefix("/api"), Some(target("/", None)));
        assert_eq!(target("/apix/users", None).strip_prefix("/api"), None);
        assert!(!target("/other", None).has_prefix("/api"));
    }

    #[test]
    fn empty_prefix_is_identity() {
        let t = target("/users", None);
        assert_eq!(t.strip_prefix(""), Some(t.clone()));
        assert_eq!(t.strip_prefix("/"), Some(t.clone()));
    }
}
