use crate::error::SwitchboardError;

/// One segment of a parsed [`RoutePattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
    /// Trailing wildcard; matches zero or more remaining segments. Only
    /// valid as the final segment of a pattern.
    Wildcard,
}

/// A parsed, validated `/`-delimited route pattern.
///
/// Patterns are split on `/`, ignoring a single leading and trailing empty
/// segment so that `/a/b`, `a/b`, and `/a/b/` all parse identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    pub raw: String,
    pub segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, SwitchboardError> {
        let segments = split_segments(raw);
        let mut parsed = Vec::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            if *seg == "*" {
                if i != segments.len() - 1 {
                    return Err(SwitchboardError::InvalidPattern {
                        pattern: raw.to_string(),
                        reason: "'*' wildcard must be the last segment".to_string(),
                    });
                }
                parsed.push(Segment::Wildcard);
            } else if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(SwitchboardError::InvalidPattern {
                        pattern: raw.to_string(),
                        reason: "placeholder name must not be empty".to_string(),
                    });
                }
                parsed.push(Segment::Placeholder(name.to_string()));
            } else {
                parsed.push(Segment::Literal((*seg).to_string()));
            }
        }
        Ok(RoutePattern {
            raw: raw.to_string(),
            segments: parsed,
        })
    }

    pub fn has_trailing_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }

    pub fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Placeholder(_)))
            .count()
    }

    /// Matches `path` against this pattern, returning bound placeholder
    /// values in declaration order when it matches.
    pub fn matches(&self, path_segments: &[&str]) -> Option<Vec<(String, String)>> {
        let mut params = Vec::new();
        let mut i = 0;
        for seg in &self.segments {
            match seg {
                Segment::Wildcard => return Some(params),
                Segment::Literal(lit) => {
                    if path_segments.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                    i += 1;
                }
                Segment::Placeholder(name) => {
                    let value = *path_segments.get(i)?;
                    params.push((name.clone(), value.to_string()));
                    i += 1;
                }
            }
        }
        if i == path_segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

/// Splits a `/`-delimited pattern or path into segments, dropping one
/// leading and one trailing empty segment (the result of a leading or
/// trailing `/`) so callers don't have to special-case root-anchored paths.
pub fn split_segments(raw: &str) -> Vec<&str> {
    let trimmed = raw.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// A registered (method, pattern, handler) triple. Immutable once built;
/// the registry replaces rather than mutates an entry on re-registration.
#[derive(Debug, Clone)]
pub struct Route<H> {
    pub method: crate::request::HttpMethod,
    pub pattern: RoutePattern,
    pub handler: H,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_placeholder_and_wildcard_segments() {
        let p = RoutePattern::parse("/api/users/{id}/posts/*").unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Literal("api".into()),
                Segment::Literal("users".into()),
                Segment::Placeholder("id".into()),
                Segment::Literal("posts".into()),
                Segment::Wildcard,
            ]
        );
    }

    #[test]
    fn rejects_non_terminal_wildcard() {
        let err = RoutePattern::parse("/a/*/b").unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidPattern { .. }));
    }

    #[test]
    fn wildcard_matches_zero_remaining_segments() {
        let p = RoutePattern::parse("/api/*").unwrap();
        let matched = p.matches(&["api"]);
        assert_eq!(matched, Some(vec![]));
    }

    #[test]
    fn placeholder_binds_corresponding_segment() {
        let p = RoutePattern::parse("/api/users/{id}").unwrap();
        let matched = p.matches(&["api", "users", "456"]).unwrap();
        assert_eq!(matched, vec![("id".to_string(), "456".to_string())]);
    }

    #[test]
    fn literal_mismatch_does_not_match() {
        let p = RoutePattern::parse("/api/users/{id}").unwrap();
        assert_eq!(p.matches(&["api", "groups", "456"]), None);
    }

    #[test]
    fn segment_count_mismatch_without_wildcard_does_not_match() {
        let p = RoutePattern::parse("/api/users/{id}").unwrap();
        assert_eq!(p.matches(&["api", "users", "456", "extra"]), None);
    }
}
