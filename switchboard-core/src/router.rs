use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::error::SwitchboardError;
use crate::request::HttpMethod;
use crate::route::{split_segments, Route, RoutePattern};

/// The outcome of a successful [`Router::match_route`] lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch<H> {
    pub handler: H,
    pub params: Vec<(String, String)>,
}

/// A hot, immutable snapshot of the registered routes, rebuilt whenever the
/// registry mutates. Lookups read only this snapshot so concurrent readers
/// never block on a writer.
struct CompiledRouter<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for CompiledRouter<H> {
    fn default() -> Self {
        CompiledRouter { routes: Vec::new() }
    }
}

/// Maps (method, path) to a handler and its extracted path parameters.
///
/// Follows the source gateway's `ArcSwap` snapshot + concurrent source-of-
/// truth map + version counter idiom for the hot read path, but the match
/// itself is a hand-rolled segment comparison rather than a trie lookup:
/// a radix-trie matcher returns a single match per path and cannot express
/// the tie-break precedence this registry's lookup contract requires
/// (literal-segment count, then placeholder count, then wildcard absence,
/// then lexicographic pattern order) when more than one pattern matches.
pub struct Router<H> {
    inner: ArcSwap<CompiledRouter<H>>,
    routes: DashMap<(HttpMethod, String), Route<H>>,
    version: AtomicU64,
}

impl<H: Clone> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone> Router<H> {
    pub fn new() -> Self {
        Router {
            inner: ArcSwap::from_pointee(CompiledRouter::default()),
            routes: DashMap::new(),
            version: AtomicU64::new(0),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(AtomicOrdering::Acquire)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Registers `pattern` for `method`. Re-registering the same
    /// (pattern, method) silently overwrites the previous handler.
    pub fn add_route(
        &self,
        pattern: &str,
        method: HttpMethod,
        handler: H,
    ) -> Result<(), SwitchboardError> {
        let parsed = RoutePattern::parse(pattern)?;
        self.routes.insert(
            (method, pattern.to_string()),
            Route {
                method,
                pattern: parsed,
                handler,
            },
        );
        self.rebuild();
        Ok(())
    }

    pub fn remove_route(&self, pattern: &str, method: HttpMethod) -> bool {
        let removed = self.routes.remove(&(method, pattern.to_string())).is_some();
        if removed {
            self.rebuild();
        }
        removed
    }

    pub fn get_route(&self, pattern: &str, method: HttpMethod) -> Option<Route<H>> {
        self.routes.get(&(method, pattern.to_string())).map(|r| r.clone())
    }

    pub fn all_routes(&self) -> Vec<Route<H>> {
        self.routes.iter().map(|r| r.value().clone()).collect()
    }

    /// Rebuilds the hot snapshot from the concurrent source-of-truth map
    /// and bumps the version counter. Called automatically by mutating
    /// methods; exposed for callers that batch external mutation.
    pub fn rebuild(&self) {
        let routes: Vec<Route<H>> = self.routes.iter().map(|r| r.value().clone()).collect();
        self.inner.store(Arc::new(CompiledRouter { routes }));
        self.version.fetch_add(1, AtomicOrdering::AcqRel);
    }

    /// Looks up `(method, path)`. Total: never fails, returns `None` on no
    /// match rather than an error. Method mismatch on an otherwise-matching
    /// path is indistinguishable from no match at this layer (the
    /// transport is responsible for telling a 404 apart from a 405 by
    /// re-querying with a wildcard method check if it needs to).
    pub fn match_route(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<H>> {
        let path_segments = split_segments(path);
        let snapshot = self.inner.load();

        let mut best: Option<(&Route<H>, Vec<(String, String)>)> = None;
        for route in &snapshot.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = route.pattern.matches(&path_segments) {
                let candidate = (route, params);
                best = Some(match best {
                    None => candidate,
                    Some(current) => {
                        if precedence_order(&candidate.0.pattern, &current.0.pattern) == Ordering::Less {
                            candidate
                        } else {
                            current
                        }
                    }
                });
            }
        }

        best.map(|(route, params)| RouteMatch {
            handler: route.handler.clone(),
            params,
        })
    }
}

/// Orders two matching patterns by precedence; `Less` means `a` wins.
fn precedence_order(a: &RoutePattern, b: &RoutePattern) -> Ordering {
    // (a) more literal segments wins -> compare descending.
    b.literal_count()
        .cmp(&a.literal_count())
        // (b) fewer placeholders wins -> compare ascending.
        .then_with(|| a.placeholder_count().cmp(&b.placeholder_count()))
        // (c) no trailing wildcard wins -> false sorts before true.
        .then_with(|| a.has_trailing_wildcard().cmp(&b.has_trailing_wildcard()))
        // (d) lexicographic pattern order.
        .then_with(|| a.raw.cmp(&b.raw))
}
