//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit `None` rather than silent default

use axum::body::Body;
use axum::http::Request;

use crate::config::RouteConfig;
use crate::forward::{ForwardTarget, TargetError};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub target: ForwardTarget,
    pub priority: u32,
    matcher: AndMatcher,
}

impl Route {
    pub fn compile(config: &RouteConfig) -> Result<Self, TargetError> {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host)));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
        }

        Ok(Self {
            name: config.name.clone(),
            target: config.target.parse()?,
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
        })
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile routes; higher priority first, ties keep file order.
    pub fn new(configs: &[RouteConfig]) -> Result<Self, TargetError> {
        let mut routes = configs
            .iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { routes })
    }

    /// First matching route, if any.
    pub fn route(&self, req: &Request<Body>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(req))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
