//! Inbound envelope normalization.
//!
//! Turns the raw invocation payload delivered by an API gateway or load
//! balancer into a [`RequestDescriptor`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::Method;
use serde_json::{Map, Value as JsonValue};

use crate::{
    core::{BridgeResult, HeaderBag, RequestDescriptor},
    envelope_error,
};

const FIELD_METHOD: &str = "httpMethod";
const FIELD_PATH: &str = "path";
const FIELD_HEADERS: &str = "headers";
const FIELD_MULTI_VALUE_HEADERS: &str = "multiValueHeaders";
const FIELD_QUERY: &str = "queryStringParameters";
const FIELD_MULTI_VALUE_QUERY: &str = "multiValueQueryStringParameters";
const FIELD_BODY: &str = "body";
const FIELD_BASE64: &str = "isBase64Encoded";
const FIELD_REQUEST_CONTEXT: &str = "requestContext";
const FIELD_REQUEST_ID: &str = "requestId";

/// Build a request from an invocation envelope.
///
/// `httpMethod` is required; `path` defaults to `/`. Multi-value headers and
/// query parameters take precedence over their single-value counterparts
/// for the same name.
///
/// # Errors
/// Returns `InvalidEnvelope` for a non-object envelope, a missing or invalid
/// method, malformed header/query maps or an undecodable base64 body.
pub fn normalize_request(envelope: &JsonValue) -> BridgeResult<RequestDescriptor> {
    let fields = envelope
        .as_object()
        .ok_or_else(|| envelope_error!("envelope must be a JSON object"))?;

    let method = parse_method(fields)?;
    let path = optional_str(fields, FIELD_PATH)?.unwrap_or("/");

    let mut request = RequestDescriptor::new(method, path)
        .with_headers(parse_headers(fields)?);

    if let Some(id) = request_id(fields) {
        request = request.with_id(id);
    }

    for (name, value) in parse_query(fields)? {
        request = request.with_query(name, value);
    }

    if let Some(body) = parse_body(fields)? {
        request = request.with_body(body);
    }

    Ok(request)
}

fn parse_method(fields: &Map<String, JsonValue>) -> BridgeResult<Method> {
    let raw = match fields.get(FIELD_METHOD) {
        Some(JsonValue::String(method)) => method.trim(),
        Some(other) => return Err(envelope_error!("{FIELD_METHOD} must be a string, got {other}")),
        None => return Err(envelope_error!("missing {FIELD_METHOD}")),
    };

    if raw.is_empty() {
        return Err(envelope_error!("{FIELD_METHOD} is empty"));
    }

    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|e| envelope_error!("invalid {FIELD_METHOD} {raw:?}: {e}"))
}

fn optional_str<'a>(fields: &'a Map<String, JsonValue>, key: &str) -> BridgeResult<Option<&'a str>> {
    match fields.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(value)) => Ok(Some(value.as_str())),
        Some(other) => Err(envelope_error!("{key} must be a string, got {other}")),
    }
}

fn optional_object<'a>(
    fields: &'a Map<String, JsonValue>,
    key: &str,
) -> BridgeResult<Option<&'a Map<String, JsonValue>>> {
    match fields.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Object(map)) => Ok(Some(map)),
        Some(other) => Err(envelope_error!("{key} must be an object, got {other}")),
    }
}

fn scalar_to_string(key: &str, name: &str, value: &JsonValue) -> BridgeResult<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(envelope_error!("{key}.{name} must be a string, got {other}")),
    }
}

fn multi_values(key: &str, name: &str, value: &JsonValue) -> BridgeResult<Vec<String>> {
    match value {
        JsonValue::Array(items) => items
            .iter()
            .map(|item| scalar_to_string(key, name, item))
            .collect(),
        other => Ok(vec![scalar_to_string(key, name, other)?]),
    }
}

fn parse_headers(fields: &Map<String, JsonValue>) -> BridgeResult<HeaderBag> {
    let mut headers = HeaderBag::new();

    if let Some(single) = optional_object(fields, FIELD_HEADERS)? {
        for (name, value) in single {
            if value.is_null() {
                continue;
            }
            headers.insert(name.clone(), scalar_to_string(FIELD_HEADERS, name, value)?);
        }
    }

    if let Some(multi) = optional_object(fields, FIELD_MULTI_VALUE_HEADERS)? {
        for (name, value) in multi {
            if value.is_null() {
                continue;
            }
            headers.insert_all(
                name.clone(),
                multi_values(FIELD_MULTI_VALUE_HEADERS, name, value)?,
            );
        }
    }

    Ok(headers)
}

fn parse_query(fields: &Map<String, JsonValue>) -> BridgeResult<Vec<(String, String)>> {
    let mut query: Vec<(String, String)> = Vec::new();

    if let Some(single) = optional_object(fields, FIELD_QUERY)? {
        for (name, value) in single {
            if value.is_null() {
                continue;
            }
            query.push((name.clone(), scalar_to_string(FIELD_QUERY, name, value)?));
        }
    }

    if let Some(multi) = optional_object(fields, FIELD_MULTI_VALUE_QUERY)? {
        for (name, value) in multi {
            if value.is_null() {
                continue;
            }
            query.retain(|(k, _)| k != name);
            for item in multi_values(FIELD_MULTI_VALUE_QUERY, name, value)? {
                query.push((name.clone(), item));
            }
        }
    }

    Ok(query)
}

fn parse_body(fields: &Map<String, JsonValue>) -> BridgeResult<Option<Bytes>> {
    let Some(body) = optional_str(fields, FIELD_BODY)? else {
        return Ok(None);
    };

    let encoded = matches!(fields.get(FIELD_BASE64), Some(JsonValue::Bool(true)));
    if encoded {
        let decoded = STANDARD
            .decode(body)
            .map_err(|e| envelope_error!("{FIELD_BODY} is not valid base64: {e}"))?;
        Ok(Some(Bytes::from(decoded)))
    } else {
        Ok(Some(Bytes::copy_from_slice(body.as_bytes())))
    }
}

fn request_id(fields: &Map<String, JsonValue>) -> Option<String> {
    fields
        .get(FIELD_REQUEST_CONTEXT)
        .and_then(|ctx| ctx.get(FIELD_REQUEST_ID))
        .and_then(JsonValue::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
