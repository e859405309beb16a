//! Declarative route handlers.
//!
//! Routes in the config name a handler and pass it a YAML `options` block.
//! Handlers are built once at boot and shared by every request.

pub mod bind;
pub mod echo;
pub mod fail;

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::core::{BridgeError, BridgeResult, RouteHandler};

/// Factory building a handler from its route options.
pub type HandlerCreateFn = fn(YamlValue) -> BridgeResult<Arc<dyn RouteHandler>>;

/// Global registry mapping handler names to their factory functions.
static HANDLER_BUILDER_REGISTRY: Lazy<HashMap<&'static str, HandlerCreateFn>> = Lazy::new(|| {
    let arr: Vec<(&str, HandlerCreateFn)> = vec![
        (echo::HANDLER_NAME, echo::create_echo_handler),
        (bind::BIND_HANDLER_NAME, bind::create_bind_handler),
        (bind::BOUND_HANDLER_NAME, bind::create_bound_handler),
        (fail::HANDLER_NAME, fail::create_fail_handler),
    ];
    arr.into_iter().collect()
});

/// Whether a handler with this name can be built.
pub fn is_registered(name: &str) -> bool {
    HANDLER_BUILDER_REGISTRY.contains_key(name)
}

/// Creates a handler from route options.
///
/// Missing options (`null`) are treated as an empty mapping so handlers with
/// all-default options need no `options` block.
///
/// # Errors
/// Returns `Configuration` for unknown handler names or invalid options.
pub fn build_handler(name: &str, options: YamlValue) -> BridgeResult<Arc<dyn RouteHandler>> {
    let builder = HANDLER_BUILDER_REGISTRY
        .get(name)
        .ok_or_else(|| BridgeError::Configuration(format!("Unknown handler type: {name}")))?;

    let options = match options {
        YamlValue::Null => YamlValue::Mapping(Mapping::new()),
        other => other,
    };
    builder(options)
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::core::{ExecutionContext, RequestDescriptor, RouteParams};
    use crate::core::context::{ContextId, Prototype};

    #[test]
    fn test_unknown_handler() {
        let err = build_handler("teapot", YamlValue::Null).err().unwrap();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert!(!is_registered("teapot"));
    }

    #[test]
    fn test_null_options_use_defaults() {
        let handler = build_handler("echo", YamlValue::Null).unwrap();
        let request = RequestDescriptor::new(Method::GET, "/");
        let mut ctx = ExecutionContext::from_prototype(ContextId(1), &Prototype::default());

        let response = handler
            .handle(&request, &RouteParams::new(), &mut ctx)
            .unwrap();
        assert_eq!(response.status.as_u16(), 200);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_every_builtin_is_registered() {
        for name in ["echo", "bind", "bound", "fail"] {
            assert!(is_registered(name), "{name} should be registered");
        }
    }
}
