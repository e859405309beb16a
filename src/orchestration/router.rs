//! Request routing orchestration
//!
//! A thin path/method table in front of the route handlers. It is the
//! reference [`Dispatcher`] used by the CLI and the worker; applications with
//! their own dispatch engine plug that in instead.

use std::{collections::HashMap, sync::Arc};

use http::{Method, StatusCode};
use log::debug;
use matchit::{Match, Router as MatchRouter};

use crate::{
    config::Config,
    core::{
        BridgeError, BridgeResult, DispatchResult, Dispatcher, ExecutionContext,
        InternalResponse, RequestDescriptor, RouteHandler, RouteParams,
    },
    handler::build_handler,
};

/// Request attribute holding the id of the matched route
pub const ATTR_ROUTE_ID: &str = "route_id";

/// Request attribute holding the pattern of the matched route
pub const ATTR_MATCHED_URI: &str = "matched_uri";

struct MethodHandler {
    route_id: String,
    handler: Arc<dyn RouteHandler>,
}

struct RouteEntry {
    uri: String,
    methods: HashMap<Method, MethodHandler>,
}

/// Request router that matches requests to route handlers
#[derive(Default)]
pub struct RequestRouter {
    /// Route matching engine; values index into `entries`
    matcher: MatchRouter<usize>,
    entries: Vec<RouteEntry>,
    by_uri: HashMap<String, usize>,
}

impl RequestRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the routing table from config, creating every route handler.
    pub fn from_config(config: &Config) -> BridgeResult<Self> {
        let mut router = Self::new();
        for route in &config.routes {
            let handler = build_handler(&route.handler, route.options.clone())?;
            router.route(&route.id, &route.uri, route.get_methods(), handler)?;
            debug!("Added route: {} {} -> {}", route.id, route.uri, route.handler);
        }
        Ok(router)
    }

    /// Register `handler` for `methods` on `uri`.
    ///
    /// Several routes may share a uri as long as their methods differ.
    pub fn route(
        &mut self,
        route_id: &str,
        uri: &str,
        methods: Vec<Method>,
        handler: Arc<dyn RouteHandler>,
    ) -> BridgeResult<()> {
        let index = match self.by_uri.get(uri) {
            Some(index) => *index,
            None => {
                let index = self.entries.len();
                self.matcher.insert(uri, index)?;
                self.entries.push(RouteEntry {
                    uri: uri.to_string(),
                    methods: HashMap::new(),
                });
                self.by_uri.insert(uri.to_string(), index);
                index
            }
        };

        let entry = &mut self.entries[index];
        for method in methods {
            if let Some(existing) = entry.methods.get(&method) {
                return Err(BridgeError::Routing(format!(
                    "{method} {uri} already served by route {}",
                    existing.route_id
                )));
            }
            entry.methods.insert(
                method,
                MethodHandler {
                    route_id: route_id.to_string(),
                    handler: handler.clone(),
                },
            );
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Dispatcher for RequestRouter {
    fn dispatch(&self, request: &RequestDescriptor, ctx: &mut ExecutionContext) -> DispatchResult {
        let Ok(Match { value, params }) = self.matcher.at(request.path()) else {
            return Ok(InternalResponse::new("Not Found").with_status(StatusCode::NOT_FOUND));
        };

        let entry = &self.entries[*value];
        let Some(target) = entry.methods.get(request.method()) else {
            let mut allowed: Vec<&str> = entry.methods.keys().map(Method::as_str).collect();
            allowed.sort_unstable();
            return Ok(InternalResponse::new("Method Not Allowed")
                .with_status(StatusCode::METHOD_NOT_ALLOWED)
                .with_header("Allow", allowed.join(", ")));
        };

        let params: RouteParams = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ctx.set(ATTR_ROUTE_ID, target.route_id.clone());
        ctx.set(ATTR_MATCHED_URI, entry.uri.clone());

        target.handler.handle(request, &params, ctx)
    }
}
