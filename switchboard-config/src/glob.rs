/// Matches `path` against a `*`-wildcard route pattern.
///
/// `*` matches one path segment; `**` matches any number of remaining
/// segments (including zero). This is distinct from
/// [`switchboard_core::route::RoutePattern`]'s named `:param` matching —
/// config route selectors only ever need wildcard gating, never capture.
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    let pattern_segs: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    matches_segments(&pattern_segs, &path_segs)
}

fn matches_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=path.len()).any(|i| matches_segments(&pattern[1..], &path[i..]))
        }
        Some(&"*") => {
            !path.is_empty() && matches_segments(&pattern[1..], &path[1..])
        }
        Some(seg) => {
            !path.is_empty() && path[0] == *seg && matches_segments(&pattern[1..], &path[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(glob_matches("/api/v1/users", "/api/v1/users"));
        assert!(!glob_matches("/api/v1/users", "/api/v1/orders"));
    }

    #[test]
    fn single_star_matches_one_segment() {
        assert!(glob_matches("/api/v1/*", "/api/v1/users"));
        assert!(!glob_matches("/api/v1/*", "/api/v1/users/1"));
    }

    #[test]
    fn double_star_matches_remaining_segments() {
        assert!(glob_matches("/api/**", "/api/v1/users/1"));
        assert!(glob_matches("/api/**", "/api"));
    }

    #[test]
    fn root_pattern_matches_only_root() {
        assert!(glob_matches("/", "/"));
        assert!(!glob_matches("/", "/x"));
    }
}
