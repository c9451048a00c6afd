//! Datagram encoding and application payload classification

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

use super::{Envelope, RequestBody, ResponseBody};

/// Datagram size used by existing peers; larger frames get truncated on their side
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 1024;

/// Largest payload a single IPv4 UDP datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Encode an envelope, rejecting it if it does not fit in one datagram
pub fn encode_envelope(envelope: &Envelope, max_size: usize) -> Result<Vec<u8>> {
    let bytes = envelope.to_json_bytes()?;
    if bytes.len() > max_size {
        return Err(Error::PayloadTooLarge {
            size: bytes.len(),
            max: max_size,
        });
    }
    Ok(bytes)
}

/// Decode one datagram into an envelope
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    Envelope::from_json_bytes(bytes).map_err(|e| {
        Error::malformed(format!("envelope ({} bytes): {}", bytes.len(), e))
    })
}

/// Decoded payload of an application envelope
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationBody {
    Request(RequestBody),
    Response(ResponseBody),
}

impl ApplicationBody {
    /// Classify and decode an application payload.
    ///
    /// Responses are the payloads that carry a `Status` key; everything else
    /// is decoded as a request.
    pub fn decode(data: &Value) -> Result<Self> {
        if is_response(data) {
            let body = ResponseBody::deserialize(data)
                .map_err(|e| Error::malformed(format!("response body: {}", e)))?;
            Ok(ApplicationBody::Response(body))
        } else {
            let body = RequestBody::deserialize(data)
                .map_err(|e| Error::malformed(format!("request body: {}", e)))?;
            Ok(ApplicationBody::Request(body))
        }
    }
}

/// Whether an application payload is a response
pub fn is_response(data: &Value) -> bool {
    data.as_object()
        .map(|obj| obj.contains_key("Status"))
        .unwrap_or(false)
}

/// Correlation token of a payload, read without decoding the rest
pub fn correlation_id(data: &Value) -> Option<&str> {
    data.get("ID")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::protocol::{Origin, Status};
    use serde_json::json;

    #[test]
    fn test_encode_within_limit() {
        let env = Envelope::heartbeat(Origin::new("a", "127.0.0.1:1024"));
        let bytes = encode_envelope(&env, DEFAULT_MAX_DATAGRAM_SIZE).unwrap();
        assert_eq!(decode_envelope(&bytes).unwrap(), env);
    }

    #[test]
    fn test_encode_rejects_oversized() {
        let big = "x".repeat(2048);
        let env = Envelope::application(Origin::new("a", "b"), json!({ "Path": "p", "Data": big }));

        match encode_envelope(&env, DEFAULT_MAX_DATAGRAM_SIZE) {
            Err(Error::PayloadTooLarge { size, max }) => {
                assert!(size > max);
                assert_eq!(max, DEFAULT_MAX_DATAGRAM_SIZE);
            }
            other => panic!("Expected PayloadTooLarge, got {:?}", other),
        }

        assert!(encode_envelope(&env, MAX_UDP_PAYLOAD).is_ok());
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_envelope(b"\x00\x01not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProtocolMalformed);
    }

    #[test]
    fn test_classify_request_and_response() {
        let req = json!({"ID": "r1", "Path": "echo", "Data": {"n": 1}});
        match ApplicationBody::decode(&req).unwrap() {
            ApplicationBody::Request(body) => {
                assert_eq!(body.id, "r1");
                assert_eq!(body.data, json!({"n": 1}));
            }
            other => panic!("Expected request, got {:?}", other),
        }

        let resp = json!({"ID": "r1", "Path": "echo", "Status": "NOT_FOUND", "Error": "", "Data": null});
        match ApplicationBody::decode(&resp).unwrap() {
            ApplicationBody::Response(body) => assert_eq!(body.status, Status::NotFound),
            other => panic!("Expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_malformed() {
        assert!(ApplicationBody::decode(&json!("just a string")).is_err());
        assert!(ApplicationBody::decode(&json!({"Path": "p", "Status": "MAYBE"})).is_err());
    }

    #[test]
    fn test_correlation_id() {
        assert_eq!(correlation_id(&json!({"ID": "abc"})), Some("abc"));
        assert_eq!(correlation_id(&json!({"ID": ""})), None);
        assert_eq!(correlation_id(&json!({"Path": "p"})), None);
        assert_eq!(correlation_id(&Value::Null), None);
    }
}
