//! Typed calls on top of a composed invoker chain.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::errors::InvokeError;
use crate::invoke::SharedInvoker;
use crate::message::MessageOptions;
use crate::rpc::{
    Document, InputDocument, InputFile, InputMedia, Peer, Request, Response, StickerSet,
};

#[derive(Clone)]
pub struct Api {
    invoker: SharedInvoker,
}

#[derive(Debug, Deserialize)]
struct AuthStatus {
    authorized: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
enum MessageMedia {
    #[serde(rename = "messageMediaDocument")]
    Document { document: Option<Document> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct FileChunk {
    bytes: String,
}

impl Api {
    pub fn new(invoker: SharedInvoker) -> Self {
        Self { invoker }
    }

    pub async fn call(
        &self,
        cancel: &CancellationToken,
        request: Request,
    ) -> Result<Response, InvokeError> {
        self.invoker.invoke(cancel, &request).await
    }

    pub async fn is_authorized(&self, cancel: &CancellationToken) -> Result<bool, InvokeError> {
        let status: AuthStatus = self
            .call(cancel, Request::new("auth.status", json!({})))
            .await?
            .decode()?;
        Ok(status.authorized)
    }

    pub async fn import_bot_authorization(
        &self,
        cancel: &CancellationToken,
        app_id: i32,
        app_hash: &str,
        bot_token: &str,
    ) -> Result<(), InvokeError> {
        let request = Request::new(
            "auth.importBotAuthorization",
            json!({"api_id": app_id, "api_hash": app_hash, "bot_auth_token": bot_token}),
        );
        self.call(cancel, request).await.map(|_| ())
    }

    pub async fn resolve_username(
        &self,
        cancel: &CancellationToken,
        username: &str,
    ) -> Result<Peer, InvokeError> {
        let username = username.trim_start_matches('@');
        self.call(
            cancel,
            Request::new("contacts.resolveUsername", json!({"username": username})),
        )
        .await?
        .decode()
    }

    pub async fn send_message(
        &self,
        cancel: &CancellationToken,
        peer: &Peer,
        text: &str,
        options: &MessageOptions,
    ) -> Result<Response, InvokeError> {
        let mut params = json!({"peer": peer, "message": text});
        options.apply(&mut params);
        self.call(cancel, Request::new("messages.sendMessage", params))
            .await
    }

    pub async fn send_media(
        &self,
        cancel: &CancellationToken,
        peer: &Peer,
        media: &InputMedia,
        caption: &str,
        options: &MessageOptions,
    ) -> Result<Response, InvokeError> {
        let mut params = json!({"peer": peer, "media": media, "message": caption});
        options.apply(&mut params);
        self.call(cancel, Request::new("messages.sendMedia", params))
            .await
    }

    /// Tell `peer` that a document upload is in progress.
    pub async fn set_upload_action(
        &self,
        cancel: &CancellationToken,
        peer: &Peer,
        percent: u8,
    ) -> Result<(), InvokeError> {
        let request = Request::new(
            "messages.setTyping",
            json!({
                "peer": peer,
                "action": {"_": "sendMessageUploadDocumentAction", "progress": percent},
            }),
        );
        self.call(cancel, request).await.map(|_| ())
    }

    pub async fn save_file_part(
        &self,
        cancel: &CancellationToken,
        file_id: i64,
        part: u32,
        bytes: Vec<u8>,
    ) -> Result<(), InvokeError> {
        let request = Request::new(
            "upload.saveFilePart",
            json!({"file_id": file_id, "file_part": part}),
        )
        .with_payload(bytes);
        self.call(cancel, request).await.map(|_| ())
    }

    pub async fn save_big_file_part(
        &self,
        cancel: &CancellationToken,
        file_id: i64,
        part: u32,
        total_parts: u32,
        bytes: Vec<u8>,
    ) -> Result<(), InvokeError> {
        let request = Request::new(
            "upload.saveBigFilePart",
            json!({"file_id": file_id, "file_part": part, "file_total_parts": total_parts}),
        )
        .with_payload(bytes);
        self.call(cancel, request).await.map(|_| ())
    }

    /// Confirm an uploaded file as media without sending it anywhere.
    pub async fn upload_media(
        &self,
        cancel: &CancellationToken,
        peer: &Peer,
        media: &InputMedia,
    ) -> Result<Document, InvokeError> {
        let media: MessageMedia = self
            .call(
                cancel,
                Request::new("messages.uploadMedia", json!({"peer": peer, "media": media})),
            )
            .await?
            .decode()?;
        match media {
            MessageMedia::Document {
                document: Some(document),
            } => Ok(document),
            MessageMedia::Document { document: None } => {
                Err(InvokeError::permanent("uploaded media has an empty document"))
            }
            MessageMedia::Other => Err(InvokeError::permanent(
                "uploaded media is not a document",
            )),
        }
    }

    pub async fn get_sticker_set(
        &self,
        cancel: &CancellationToken,
        short_name: &str,
    ) -> Result<StickerSet, InvokeError> {
        self.call(
            cancel,
            Request::new(
                "messages.getStickerSet",
                json!({"stickerset": sticker_set_ref(short_name)}),
            ),
        )
        .await?
        .decode()
    }

    pub async fn add_sticker_to_set(
        &self,
        cancel: &CancellationToken,
        short_name: &str,
        document: InputDocument,
        emoji: &str,
    ) -> Result<StickerSet, InvokeError> {
        self.call(
            cancel,
            Request::new(
                "stickers.addStickerToSet",
                json!({
                    "stickerset": sticker_set_ref(short_name),
                    "sticker": sticker_item(document, emoji),
                }),
            ),
        )
        .await?
        .decode()
    }

    pub async fn create_sticker_set(
        &self,
        cancel: &CancellationToken,
        request: CreateStickerSet<'_>,
    ) -> Result<StickerSet, InvokeError> {
        let params = json!({
            "masks": request.masks,
            "animated": request.animated,
            "user_id": request.owner,
            "title": request.title,
            "short_name": request.short_name,
            "stickers": [sticker_item(request.document, request.emoji)],
        });
        self.call(cancel, Request::new("stickers.createStickerSet", params))
            .await?
            .decode()
    }

    pub async fn remove_sticker_from_set(
        &self,
        cancel: &CancellationToken,
        document: InputDocument,
    ) -> Result<(), InvokeError> {
        self.call(
            cancel,
            Request::new("stickers.removeStickerFromSet", json!({"sticker": document})),
        )
        .await
        .map(|_| ())
    }

    /// Fetch `limit` bytes of a document starting at `offset`.
    pub async fn get_file(
        &self,
        cancel: &CancellationToken,
        document: &Document,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<u8>, InvokeError> {
        let location = json!({
            "_": "inputDocumentFileLocation",
            "id": document.id,
            "access_hash": document.access_hash,
            "file_reference": document.file_reference,
            "thumb_size": "",
        });
        let chunk: FileChunk = self
            .call(
                cancel,
                Request::new(
                    "upload.getFile",
                    json!({"location": location, "offset": offset, "limit": limit}),
                ),
            )
            .await?
            .decode()?;
        BASE64
            .decode(chunk.bytes)
            .map_err(|err| InvokeError::permanent(format!("decode file chunk: {err}")))
    }
}

/// Arguments of `stickers.createStickerSet`.
#[derive(Debug, Clone)]
pub struct CreateStickerSet<'a> {
    pub owner: &'a Peer,
    pub title: &'a str,
    pub short_name: &'a str,
    pub document: InputDocument,
    pub emoji: &'a str,
    pub masks: bool,
    pub animated: bool,
}

fn sticker_set_ref(short_name: &str) -> Value {
    json!({"_": "inputStickerSetShortName", "short_name": short_name})
}

fn sticker_item(document: InputDocument, emoji: &str) -> Value {
    json!({"_": "inputStickerSetItem", "document": document, "emoji": emoji})
}

/// Uploaded document media without attributes.
pub fn uploaded_document(file: InputFile, mime_type: impl Into<String>) -> InputMedia {
    InputMedia::UploadedDocument {
        file,
        mime_type: mime_type.into(),
        attributes: Vec::new(),
        force_file: false,
    }
}
