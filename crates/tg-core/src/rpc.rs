//! Request/response vocabulary shared by every invoker in the chain.
//!
//! Requests are method name + JSON parameters, with an optional raw binary
//! payload (file parts) that the transport encodes on the wire.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::InvokeError;

/// One remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: &'static str,
    pub params: Value,
    pub payload: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: &'static str, params: Value) -> Self {
        Self {
            method,
            params,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.params)?;
        if let Some(payload) = &self.payload {
            write!(f, " <{} bytes>", payload.len())?;
        }
        Ok(())
    }
}

/// Decoded `result` of a successful call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response(pub Value);

impl Response {
    pub fn empty() -> Self {
        Self(Value::Bool(true))
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, InvokeError> {
        serde_json::from_value(self.0)
            .map_err(|err| InvokeError::permanent(format!("decode response: {err}")))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved destination of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum Peer {
    #[serde(rename = "inputPeerSelf")]
    SelfPeer,
    #[serde(rename = "inputPeerUser")]
    User { user_id: i64, access_hash: i64 },
    #[serde(rename = "inputPeerChat")]
    Chat { chat_id: i64 },
    #[serde(rename = "inputPeerChannel")]
    Channel { channel_id: i64, access_hash: i64 },
}

impl Peer {
    pub fn is_user(&self) -> bool {
        matches!(self, Peer::User { .. })
    }
}

/// Reference to a fully uploaded file, ready to attach to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum InputFile {
    #[serde(rename = "inputFile")]
    Small { id: i64, parts: u32, name: String },
    #[serde(rename = "inputFileBig")]
    Big { id: i64, parts: u32, name: String },
}

impl InputFile {
    pub fn parts(&self) -> u32 {
        match self {
            InputFile::Small { parts, .. } | InputFile::Big { parts, .. } => *parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum DocumentAttribute {
    #[serde(rename = "documentAttributeFilename")]
    Filename { file_name: String },
    #[serde(rename = "documentAttributeVideo")]
    Video { supports_streaming: bool },
    #[serde(rename = "documentAttributeAudio")]
    Audio { voice: bool },
    #[serde(rename = "documentAttributeAnimated")]
    Animated,
    #[serde(rename = "documentAttributeSticker")]
    Sticker { alt: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum InputMedia {
    #[serde(rename = "inputMediaUploadedDocument")]
    UploadedDocument {
        file: InputFile,
        mime_type: String,
        attributes: Vec<DocumentAttribute>,
        force_file: bool,
    },
}

/// Server-side document, as returned by media confirmation and sticker sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
}

impl Document {
    pub fn as_input(&self) -> InputDocument {
        InputDocument {
            id: self.id,
            access_hash: self.access_hash,
            file_reference: self.file_reference.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_", rename = "inputDocument")]
pub struct InputDocument {
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerSetInfo {
    pub short_name: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerSet {
    pub set: StickerSetInfo,
    #[serde(default)]
    pub documents: Vec<Document>,
}
