//! Outbound response normalization and the gateway wire format.
//!
//! Every request ends in exactly one [`ResponseEnvelope`], either built from
//! the application's response or from an unhandled failure.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::StatusCode;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    config::FailureBody,
    core::{BridgeResult, Failure, HeaderBag, InternalResponse, ResponseEnvelope},
};

/// Standard content types
pub mod content_type {
    pub const HEADER: &str = "Content-Type";
    pub const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";
}

/// Body used for failures under [`FailureBody::Generic`].
pub const GENERIC_FAILURE_BODY: &str = "Internal Server Error";

/// Convert the application's response into the canonical envelope.
///
/// Statuses outside 100..=599 are not representable in the gateway format
/// and become a 500.
pub fn normalize_response(response: InternalResponse) -> ResponseEnvelope {
    let status = response.status.as_u16();
    if !(100..600).contains(&status) {
        warn!("Dispatcher produced unsupported status {status}, answering 500");
        return ResponseEnvelope {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            headers: HeaderBag::new(),
            body: Bytes::new(),
        };
    }

    ResponseEnvelope {
        status_code: status,
        headers: response.headers,
        body: response.body,
    }
}

/// Convert an unhandled failure into a 500 envelope.
///
/// The body only ever carries the failure message, never a backtrace, so
/// the same failure always yields the same envelope.
pub fn normalize_failure(failure: &Failure, policy: FailureBody) -> ResponseEnvelope {
    let body = match policy {
        FailureBody::Empty => Bytes::new(),
        FailureBody::Generic => Bytes::from_static(GENERIC_FAILURE_BODY.as_bytes()),
        FailureBody::Diagnostic => Bytes::from(failure.message().to_string()),
    };

    let mut headers = HeaderBag::new();
    if !body.is_empty() {
        headers.insert(content_type::HEADER, content_type::TEXT_PLAIN);
    }

    ResponseEnvelope {
        status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        headers,
        body,
    }
}

/// Response shape expected by the gateway integration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub is_base64_encoded: bool,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl ResponseEnvelope {
    /// Render the envelope in gateway format. Bodies that are not valid
    /// UTF-8 are base64 encoded.
    pub fn to_gateway_format(&self) -> GatewayResponse {
        let (body, is_base64_encoded) = match std::str::from_utf8(&self.body) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (STANDARD.encode(&self.body), true),
        };

        GatewayResponse {
            is_base64_encoded,
            status_code: self.status_code,
            headers: self.headers.to_single_value_map(),
            multi_value_headers: self.headers.to_multi_value_map(),
            body,
        }
    }

    /// Gateway format serialized as JSON.
    pub fn to_json(&self, pretty: bool) -> BridgeResult<String> {
        let gateway = self.to_gateway_format();
        let json = if pretty {
            serde_json::to_string_pretty(&gateway)?
        } else {
            serde_json::to_string(&gateway)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_response_keeps_status_headers_and_body() {
        let envelope = normalize_response(
            InternalResponse::new("Hello World")
                .with_status(StatusCode::ACCEPTED)
                .with_header("Foo", "Bar"),
        );

        assert_eq!(envelope.status_code, 202);
        assert_eq!(envelope.body_text(), Some("Hello World"));
        assert_eq!(envelope.headers.first("Foo"), Some("Bar"));
    }

    #[test]
    fn test_out_of_range_status_becomes_500() {
        let status = StatusCode::from_u16(799).unwrap();
        let envelope = normalize_response(InternalResponse::new("odd").with_status(status));
        assert_eq!(envelope.status_code, 500);
        assert!(envelope.body.is_empty());
    }

    #[test]
    fn test_failure_policies() {
        let failure = Failure::new("Something wrong happened.");

        let empty = normalize_failure(&failure, FailureBody::Empty);
        assert_eq!(empty.status_code, 500);
        assert!(empty.body.is_empty());
        assert!(empty.headers.is_empty());

        let generic = normalize_failure(&failure, FailureBody::Generic);
        assert_eq!(generic.body_text(), Some(GENERIC_FAILURE_BODY));
        assert_eq!(
            generic.headers.first("content-type"),
            Some(content_type::TEXT_PLAIN)
        );

        let diagnostic = normalize_failure(&failure, FailureBody::Diagnostic);
        assert_eq!(diagnostic.body_text(), Some("Something wrong happened."));
        assert_eq!(diagnostic, normalize_failure(&failure, FailureBody::Diagnostic));
    }

    #[test]
    fn test_gateway_format() {
        let mut headers = HeaderBag::new();
        headers.insert("Foo", "Bar");
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");

        let envelope = ResponseEnvelope {
            status_code: 200,
            headers,
            body: Bytes::from_static(b"Hello World"),
        };
        let gateway = envelope.to_gateway_format();

        assert_eq!(gateway.status_code, 200);
        assert_eq!(gateway.body, "Hello World");
        assert!(!gateway.is_base64_encoded);
        assert_eq!(gateway.multi_value_headers["Foo"], vec!["Bar".to_string()]);
        assert_eq!(gateway.headers["Set-Cookie"], "b=2");
        assert_eq!(gateway.multi_value_headers["Set-Cookie"].len(), 2);
    }

    #[test]
    fn test_binary_body_is_base64_encoded() {
        let envelope = ResponseEnvelope {
            status_code: 200,
            headers: HeaderBag::new(),
            body: Bytes::from_static(&[0xff, 0xfe, 0x00]),
        };
        let gateway = envelope.to_gateway_format();
        assert!(gateway.is_base64_encoded);
        assert_eq!(gateway.body, "//4A");
    }

    #[test]
    fn test_json_field_names() {
        let envelope = normalize_response(InternalResponse::new("ok"));
        let json: serde_json::Value =
            serde_json::from_str(&envelope.to_json(false).unwrap()).unwrap();

        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"], "ok");
        assert_eq!(json["isBase64Encoded"], false);
        assert!(json["headers"].is_object());
        assert!(json["multiValueHeaders"].is_object());
    }
}
