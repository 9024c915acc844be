//! Path templates compiled into segment matchers.
//!
//! A template such as `/users/{id}/posts` splits on `/` into literal and
//! parameter segments. Splitting keeps empty segments, so `/users` and
//! `/users/` compile to different patterns and never match each other's
//! paths. Nothing is normalized, decoded or case-folded.

use std::collections::BTreeMap;
use std::fmt;

/// Path parameters bound by a successful match, keyed by parameter name.
pub type PathParams = BTreeMap<String, String>;

/// Errors related to compiling a path template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Templates are absolute paths.
    #[error("route template '{template}' must start with '/'")]
    NotAbsolute { template: String },

    /// A segment has braces that do not form a single `{name}` group.
    #[error("malformed segment '{segment}' in route template '{template}'")]
    MalformedSegment { template: String, segment: String },

    /// `{}` with no name.
    #[error("empty parameter name in route template '{template}'")]
    EmptyParameter { template: String },

    /// The same parameter name bound twice.
    #[error("parameter '{name}' appears twice in route template '{template}'")]
    DuplicateParameter { template: String, name: String },
}

/// One segment of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Must equal the request segment exactly.
    Literal(String),
    /// Binds one non-empty request segment to this name.
    Param(String),
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutePattern {
    template: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a template such as `/users/{id}`.
    ///
    /// Compiling the same template twice yields equal patterns.
    ///
    /// ```rust
    /// use opbridge::route::{RoutePattern, Segment};
    ///
    /// let pattern = RoutePattern::compile("/users/{id}").unwrap();
    /// assert_eq!(pattern.param_names(), vec!["id"]);
    /// assert_eq!(pattern.segments()[2], Segment::Param("id".to_string()));
    /// ```
    pub fn compile(template: &str) -> Result<Self, RouteError> {
        let rest = template
            .strip_prefix('/')
            .ok_or_else(|| RouteError::NotAbsolute {
                template: template.to_string(),
            })?;

        let mut segments = vec![Segment::Literal(String::new())];
        for raw in rest.split('/') {
            let segment = Self::compile_segment(template, raw)?;
            if let Segment::Param(name) = &segment {
                if segments.contains(&segment) {
                    return Err(RouteError::DuplicateParameter {
                        template: template.to_string(),
                        name: name.clone(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    fn compile_segment(template: &str, raw: &str) -> Result<Segment, RouteError> {
        if let Some(name) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if name.is_empty() {
                return Err(RouteError::EmptyParameter {
                    template: template.to_string(),
                });
            }
            if name.contains(['{', '}']) {
                return Err(RouteError::MalformedSegment {
                    template: template.to_string(),
                    segment: raw.to_string(),
                });
            }
            return Ok(Segment::Param(name.to_string()));
        }

        if raw.contains(['{', '}']) {
            return Err(RouteError::MalformedSegment {
                template: template.to_string(),
                segment: raw.to_string(),
            });
        }

        Ok(Segment::Literal(raw.to_string()))
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match a concrete request path (no query string).
    ///
    /// Returns the bound parameters, or `None` when the segment counts
    /// differ, a literal differs, or a parameter would bind an empty segment.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut parts = path.split('/');

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }

        Some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> PathParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn compile_splits_literals_and_params() {
        let pattern = RoutePattern::compile("/users/{id}").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Literal(String::new()),
                Segment::Literal("users".to_string()),
                Segment::Param("id".to_string()),
            ]
        );
    }

    #[test]
    fn compile_is_deterministic() {
        assert_eq!(
            RoutePattern::compile("/a/{b}/c/{d}").unwrap(),
            RoutePattern::compile("/a/{b}/c/{d}").unwrap()
        );
    }

    #[test]
    fn param_names_in_declaration_order() {
        let pattern = RoutePattern::compile("/orgs/{org}/repos/{repo}/issues/{number}").unwrap();
        assert_eq!(pattern.param_names(), vec!["org", "repo", "number"]);
    }

    #[test]
    fn match_binds_params() {
        let pattern = RoutePattern::compile("/users/{id}").unwrap();
        assert_eq!(pattern.match_path("/users/42"), Some(params(&[("id", "42")])));
    }

    #[test]
    fn segment_count_mismatch_is_no_match() {
        let pattern = RoutePattern::compile("/users/{id}").unwrap();
        assert_eq!(pattern.match_path("/users/42/edit"), None);
        assert_eq!(pattern.match_path("/users"), None);
    }

    #[test]
    fn literals_are_case_sensitive() {
        let pattern = RoutePattern::compile("/users/{id}").unwrap();
        assert_eq!(pattern.match_path("/Users/42"), None);
    }

    #[test]
    fn trailing_slash_is_significant() {
        let bare = RoutePattern::compile("/users").unwrap();
        let slashed = RoutePattern::compile("/users/").unwrap();

        assert!(bare.match_path("/users").is_some());
        assert!(bare.match_path("/users/").is_none());
        assert!(slashed.match_path("/users/").is_some());
        assert!(slashed.match_path("/users").is_none());
    }

    #[test]
    fn params_do_not_bind_empty_segments() {
        let pattern = RoutePattern::compile("/users/{id}").unwrap();
        assert_eq!(pattern.match_path("/users/"), None);
    }

    #[test]
    fn params_bind_literal_text() {
        let pattern = RoutePattern::compile("/files/{name}").unwrap();
        assert_eq!(
            pattern.match_path("/files/a%20b.txt"),
            Some(params(&[("name", "a%20b.txt")]))
        );
    }

    #[test]
    fn root_template() {
        let pattern = RoutePattern::compile("/").unwrap();
        assert!(pattern.match_path("/").is_some());
        assert!(pattern.match_path("/x").is_none());
    }

    #[test]
    fn every_literal_must_match() {
        let pattern = RoutePattern::compile("/a/{x}/b/{y}").unwrap();
        assert_eq!(
            pattern.match_path("/a/1/b/2"),
            Some(params(&[("x", "1"), ("y", "2")]))
        );
        assert_eq!(pattern.match_path("/a/1/c/2"), None);
        assert_eq!(pattern.match_path("a/1/b/2"), None);
    }

    #[test]
    fn invalid_templates_rejected() {
        assert!(matches!(
            RoutePattern::compile("users/{id}"),
            Err(RouteError::NotAbsolute { .. })
        ));
        assert!(matches!(
            RoutePattern::compile("/users/{}"),
            Err(RouteError::EmptyParameter { .. })
        ));
        assert!(matches!(
            RoutePattern::compile("/users/{id"),
            Err(RouteError::MalformedSegment { .. })
        ));
        assert!(matches!(
            RoutePattern::compile("/users/id}"),
            Err(RouteError::MalformedSegment { .. })
        ));
        assert!(matches!(
            RoutePattern::compile("/users/prefix-{id}"),
            Err(RouteError::MalformedSegment { .. })
        ));
        assert!(matches!(
            RoutePattern::compile("/a/{id}/b/{id}"),
            Err(RouteError::DuplicateParameter { .. })
        ));
    }
}
