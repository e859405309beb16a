use std::{collections::HashMap, sync::Arc};

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::Validate;

use crate::core::{
    BridgeError, BridgeResult, DispatchResult, ExecutionContext, InternalResponse,
    RequestDescriptor, RouteHandler, RouteParams,
};

pub const HANDLER_NAME: &str = "echo";

/// Creates an echo handler answering every request with a fixed response.
pub fn create_echo_handler(cfg: YamlValue) -> BridgeResult<Arc<dyn RouteHandler>> {
    let config = HandlerConfig::try_from(cfg)?;
    let status = StatusCode::from_u16(config.status)
        .map_err(|e| BridgeError::Configuration(format!("Invalid echo status: {e}")))?;
    Ok(Arc::new(HandlerEcho { config, status }))
}

/// A header value given either once or as a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct HandlerConfig {
    #[serde(default)]
    body: String,

    #[serde(default = "HandlerConfig::default_status")]
    #[validate(range(min = 100, max = 599))]
    status: u16,

    #[serde(default)]
    headers: HashMap<String, HeaderValues>,
}

impl HandlerConfig {
    fn default_status() -> u16 {
        200
    }
}

impl TryFrom<YamlValue> for HandlerConfig {
    type Error = BridgeError;

    fn try_from(value: YamlValue) -> Result<Self, Self::Error> {
        let config: HandlerConfig = serde_yaml::from_value(value)
            .map_err(|e| BridgeError::Configuration(format!("Invalid echo handler config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

pub struct HandlerEcho {
    config: HandlerConfig,
    status: StatusCode,
}

impl RouteHandler for HandlerEcho {
    fn handle(
        &self,
        _request: &RequestDescriptor,
        _params: &RouteParams,
        _ctx: &mut ExecutionContext,
    ) -> DispatchResult {
        let mut response = InternalResponse::new(self.config.body.clone()).with_status(self.status);
        for (name, values) in &self.config.headers {
            match values {
                HeaderValues::One(value) => response.headers.insert(name.clone(), value.clone()),
                HeaderValues::Many(values) => {
                    response.headers.insert_all(name.clone(), values.clone())
                }
            }
        }
        Ok(response)
    }
}
