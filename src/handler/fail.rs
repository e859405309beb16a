use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::Validate;

use crate::core::{
    BridgeError, BridgeResult, DispatchResult, ExecutionContext, Failure, RequestDescriptor,
    RouteHandler, RouteParams,
};

pub const HANDLER_NAME: &str = "fail";

/// Creates a handler that never produces a response.
pub fn create_fail_handler(cfg: YamlValue) -> BridgeResult<Arc<dyn RouteHandler>> {
    let config: HandlerConfig = serde_yaml::from_value(cfg)
        .map_err(|e| BridgeError::Configuration(format!("Invalid fail handler config: {e}")))?;
    config.validate()?;
    Ok(Arc::new(HandlerFail { config }))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FailMode {
    /// Return a `Failure`
    #[default]
    Error,
    /// Panic inside the handler
    Panic,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct HandlerConfig {
    #[serde(default = "HandlerConfig::default_message")]
    #[validate(length(min = 1))]
    message: String,

    #[serde(default)]
    mode: FailMode,
}

impl HandlerConfig {
    fn default_message() -> String {
        "Something wrong happened.".to_string()
    }
}

pub struct HandlerFail {
    config: HandlerConfig,
}

impl RouteHandler for HandlerFail {
    fn handle(
        &self,
        _request: &RequestDescriptor,
        _params: &RouteParams,
        _ctx: &mut ExecutionContext,
    ) -> DispatchResult {
        match self.config.mode {
            FailMode::Error => Err(Failure::new(self.config.message.clone())),
            FailMode::Panic => panic!("{}", self.config.message),
        }
    }
}
