use std::fs;
use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::{Validate, ValidationError};

use crate::{config_error, core::BridgeResult, handler};

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_route_ids"))]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub bridge: Bridge,

    /// Instances registered on the application prototype
    #[serde(default)]
    pub bindings: HashMap<String, String>,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub routes: Vec<Route>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> BridgeResult<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path)
            .map_err(|e| config_error!("Unable to read conf file from {path}: {e}"))?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    pub fn from_yaml(conf_str: &str) -> BridgeResult<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str)
            .map_err(|e| config_error!("Unable to parse yaml conf: {e}"))?;

        trace!("Loaded conf: {conf:?}");

        // use validator to validate conf file
        conf.validate()
            .map_err(|e| config_error!("Conf file valid failed: {e}"))?;

        Ok(conf)
    }

    fn validate_route_ids(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for route in &self.routes {
            if !seen.insert(route.id.as_str()) {
                let mut err = ValidationError::new("duplicate_route_id");
                err.add_param("id".into(), &route.id);
                return Err(err);
            }
        }

        Ok(())
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize, Validate)]
pub struct Bridge {
    #[serde(default)]
    pub failure_body: FailureBody,

    #[validate(nested)]
    pub log: Option<Log>,

    #[validate(nested)]
    pub access_log: Option<AccessLog>,

    #[serde(default)]
    pub prometheus: bool,
}

/// What the body of a converted 500 response contains.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureBody {
    /// No body at all
    Empty,
    /// A fixed `Internal Server Error` text
    #[default]
    Generic,
    /// The failure message, without any backtrace
    Diagnostic,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Log {
    #[validate(length(min = 1))]
    pub path: String,
    #[serde(default = "Log::default_level")]
    #[validate(custom(function = "Log::validate_level"))]
    pub level: String,
}

impl Log {
    fn default_level() -> String {
        "info".to_string()
    }

    fn validate_level(level: &str) -> Result<(), ValidationError> {
        level
            .parse::<log::LevelFilter>()
            .map(|_| ())
            .map_err(|_| ValidationError::new("invalid_log_level"))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct AccessLog {
    #[serde(default = "AccessLog::default_format")]
    #[validate(length(min = 1))]
    pub format: String,
}

impl AccessLog {
    pub fn default_format() -> String {
        "$request_id \"$request_method $uri\" $status $body_bytes_sent".to_string()
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self {
            format: Self::default_format(),
        }
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize, Validate)]
pub struct Route {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(custom(function = "Route::validate_uri"))]
    pub uri: String,

    /// Methods served by this route; empty means GET only
    #[serde(default)]
    pub methods: Vec<HttpMethod>,

    /// Name of a registered handler
    #[validate(custom(function = "Route::validate_handler"))]
    pub handler: String,

    /// Handler-specific options
    #[serde(default)]
    pub options: YamlValue,
}

impl Route {
    fn validate_uri(uri: &str) -> Result<(), ValidationError> {
        if uri.starts_with('/') {
            Ok(())
        } else {
            let mut err = ValidationError::new("uri_must_be_absolute");
            err.add_param("uri".into(), &uri.to_string());
            Err(err)
        }
    }

    fn validate_handler(handler: &str) -> Result<(), ValidationError> {
        if handler::is_registered(handler) {
            Ok(())
        } else {
            let mut err = ValidationError::new("unknown_handler");
            err.add_param("handler".into(), &handler.to_string());
            Err(err)
        }
    }

    pub fn get_methods(&self) -> Vec<http::Method> {
        if self.methods.is_empty() {
            vec![http::Method::GET]
        } else {
            self.methods.iter().map(http::Method::from).collect()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    CONNECT,
    TRACE,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let method = match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::CONNECT => "CONNECT",
            HttpMethod::TRACE => "TRACE",
        };
        write!(f, "{}", method)
    }
}

impl From<&HttpMethod> for http::Method {
    fn from(method: &HttpMethod) -> Self {
        match method {
            HttpMethod::GET => http::Method::GET,
            HttpMethod::POST => http::Method::POST,
            HttpMethod::PUT => http::Method::PUT,
            HttpMethod::DELETE => http::Method::DELETE,
            HttpMethod::PATCH => http::Method::PATCH,
            HttpMethod::HEAD => http::Method::HEAD,
            HttpMethod::OPTIONS => http::Method::OPTIONS,
            HttpMethod::CONNECT => http::Method::CONNECT,
            HttpMethod::TRACE => http::Method::TRACE,
        }
    }
}
