//! Handlers that register and check bindings in the request context.
//!
//! `bind` registers a value and answers with what the context resolves for
//! it; `bound` answers with whether a key is visible. Together they make the
//! per-request isolation observable from the outside.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::Validate;

use crate::core::{
    BridgeError, BridgeResult, DispatchResult, ExecutionContext, InternalResponse,
    RequestDescriptor, RouteHandler, RouteParams,
};

pub const BIND_HANDLER_NAME: &str = "bind";
pub const BOUND_HANDLER_NAME: &str = "bound";

/// Route parameter overriding the configured value.
const VALUE_PARAM: &str = "value";

pub fn create_bind_handler(cfg: YamlValue) -> BridgeResult<Arc<dyn RouteHandler>> {
    let config: BindConfig = parse_config(BIND_HANDLER_NAME, cfg)?;
    Ok(Arc::new(HandlerBind { config }))
}

pub fn create_bound_handler(cfg: YamlValue) -> BridgeResult<Arc<dyn RouteHandler>> {
    let config: BoundConfig = parse_config(BOUND_HANDLER_NAME, cfg)?;
    Ok(Arc::new(HandlerBound { config }))
}

fn parse_config<T>(name: &str, cfg: YamlValue) -> BridgeResult<T>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let config: T = serde_yaml::from_value(cfg)
        .map_err(|e| BridgeError::Configuration(format!("Invalid {name} handler config: {e}")))?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct BindConfig {
    #[validate(length(min = 1))]
    key: String,

    #[serde(default)]
    value: String,

    /// Register as a singleton instead of a transient binding
    #[serde(default)]
    shared: bool,
}

pub struct HandlerBind {
    config: BindConfig,
}

impl RouteHandler for HandlerBind {
    fn handle(
        &self,
        _request: &RequestDescriptor,
        params: &RouteParams,
        ctx: &mut ExecutionContext,
    ) -> DispatchResult {
        let value = params
            .get(VALUE_PARAM)
            .cloned()
            .unwrap_or_else(|| self.config.value.clone());

        if self.config.shared {
            ctx.singleton(self.config.key.clone(), move |_| value.clone());
        } else {
            ctx.bind(self.config.key.clone(), move |_| value.clone());
        }

        let resolved = ctx.make::<String>(&self.config.key)?;
        Ok(InternalResponse::new(resolved.as_str().to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct BoundConfig {
    #[validate(length(min = 1))]
    key: String,

    #[serde(default = "BoundConfig::default_bound_body")]
    bound_body: String,

    #[serde(default = "BoundConfig::default_unbound_body")]
    unbound_body: String,
}

impl BoundConfig {
    fn default_bound_body() -> String {
        "bound".to_string()
    }

    fn default_unbound_body() -> String {
        "not bound".to_string()
    }
}

pub struct HandlerBound {
    config: BoundConfig,
}

impl RouteHandler for HandlerBound {
    fn handle(
        &self,
        _request: &RequestDescriptor,
        _params: &RouteParams,
        ctx: &mut ExecutionContext,
    ) -> DispatchResult {
        let body = if ctx.bound(&self.config.key) {
            &self.config.bound_body
        } else {
            &self.config.unbound_body
        };
        Ok(InternalResponse::new(body.clone()))
    }
}
