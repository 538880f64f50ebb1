//! Webhook Payloads
//!
//! A payload is decided once, when it is built: either the flat string map
//! the event engine produced, or (in JSON mode) the decoded `jsonData` object
//! with the tenant identity merged in. Encoding happens once and the same
//! bytes are signed and sent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

/// Field carrying the serialized event.
pub const JSON_DATA_FIELD: &str = "jsonData";
/// Field carrying the tenant identifier.
pub const USER_ID_FIELD: &str = "userID";
/// Field carrying the tenant's instance name.
pub const INSTANCE_NAME_FIELD: &str = "instanceName";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Body encoding for tenant webhooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryFormat {
    Json,
    #[default]
    Form,
}

impl DeliveryFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Form => "form",
        }
    }
}

impl fmt::Display for DeliveryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "form" | "" => Ok(Self::Form),
            other => Err(format!("unknown webhook format: {other}")),
        }
    }
}

/// Payload shape, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookPayload {
    /// String fields, sent as-is.
    Flat(BTreeMap<String, String>),
    /// Decoded event object with `userID`/`instanceName` merged in.
    Structured(Map<String, Value>),
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl WebhookPayload {
    /// Build the payload for `format`.
    ///
    /// In JSON mode a `jsonData` field holding a JSON object is unwrapped into
    /// a structured payload; anything else stays flat.
    pub fn build(format: DeliveryFormat, fields: BTreeMap<String, String>, tenant_id: &str) -> Self {
        if format != DeliveryFormat::Json {
            return Self::Flat(fields);
        }

        let decoded = fields
            .get(JSON_DATA_FIELD)
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok());

        match decoded {
            Some(Value::Object(mut map)) => {
                if let Some(instance) = fields.get(INSTANCE_NAME_FIELD) {
                    map.insert(INSTANCE_NAME_FIELD.to_string(), Value::String(instance.clone()));
                }
                map.insert(USER_ID_FIELD.to_string(), Value::String(tenant_id.to_string()));
                Self::Structured(map)
            }
            _ => Self::Flat(fields),
        }
    }

    /// Encode the body. Structured payloads are always JSON.
    pub fn encode(&self, format: DeliveryFormat) -> Result<EncodedBody, EncodeError> {
        match (self, format) {
            (Self::Structured(map), _) => Ok(EncodedBody {
                content_type: JSON_CONTENT_TYPE,
                bytes: serde_json::to_vec(map)?,
            }),
            (Self::Flat(fields), DeliveryFormat::Json) => Ok(EncodedBody {
                content_type: JSON_CONTENT_TYPE,
                bytes: serde_json::to_vec(fields)?,
            }),
            (Self::Flat(fields), DeliveryFormat::Form) => Ok(EncodedBody {
                content_type: FORM_CONTENT_TYPE,
                bytes: serde_urlencoded::to_string(fields)?.into_bytes(),
            }),
        }
    }
}

/// Serialization failure while encoding a payload.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Form encoding failed: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
}
