use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A message as sent by a client.
///
/// Any `senderIp` the client puts on the wire is discarded here; the server
/// assigns it at broadcast time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Client-chosen identifier, synthesized by the server when empty
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileUpload>,
}

/// File attachment on an inbound message. May carry the full content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    /// Identifier of a previously uploaded file; empty on upload-via-message
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub media_type: String,
    /// Raw bytes, base64 on the wire
    #[serde(
        default,
        with = "base64_content",
        skip_serializing_if = "Bytes::is_empty"
    )]
    pub content: Bytes,
}

/// A message as fanned out to every client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub id: String,
    pub text: String,
    #[serde(rename = "senderIp", default, skip_serializing_if = "String::is_empty")]
    pub sender_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
}

/// Reference-only file record: identifier plus display metadata.
///
/// Has no content field; content is only served by `GET /file/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub media_type: String,
}

impl ClientMessage {
    /// Decode a JSON text frame.
    pub fn from_json(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }

    /// Decode a JSON binary frame.
    pub fn from_slice(frame: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(frame).map_err(ProtocolError::Decode)
    }

    /// A message with neither text nor file carries nothing worth relaying.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.file.is_none()
    }

    /// Assign a synthesized identifier if the client did not supply one.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = synthesize_id();
        }
    }
}

impl FileUpload {
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// The store key for this file: its own id, else the carrying message's id.
    pub fn resolve_id<'a>(&'a self, message_id: &'a str) -> &'a str {
        if self.id.is_empty() {
            message_id
        } else {
            &self.id
        }
    }

    /// Strip the content, keeping identifier and metadata.
    pub fn to_reference(&self, id: impl Into<String>) -> FileRef {
        FileRef {
            id: id.into(),
            name: self.name.clone(),
            size: self.size,
            media_type: self.media_type.clone(),
        }
    }
}

impl RelayMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Wall-clock nanoseconds since the Unix epoch, in decimal.
///
/// Two calls within the same clock tick collide; callers accept that.
pub fn synthesize_id() -> String {
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string()
}

/// Clients send `null` for blank fields; read it the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

mod base64_content {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
