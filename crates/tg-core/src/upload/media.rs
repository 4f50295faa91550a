//! Turning an uploaded file into attachable media.

use std::fmt;
use std::io::{self, SeekFrom};
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::rpc::{DocumentAttribute, InputFile, InputMedia};

pub const GIF_MIME: &str = "image/gif";
pub const FALLBACK_MIME: &str = "application/octet-stream";
const SNIFF_LEN: usize = 3072;

/// How the uploaded document should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    File,
    Video,
    Audio,
    Voice,
    Gif,
    Sticker,
}

impl MediaKind {
    pub const ALLOWED: [&'static str; 6] = ["file", "video", "audio", "voice", "gif", "sticker"];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::File => "file",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Gif => "gif",
            MediaKind::Sticker => "sticker",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown media type {0:?}, allowed values are {allowed}", allowed = MediaKind::ALLOWED.join(", "))]
pub struct UnknownMediaKind(String);

impl FromStr for MediaKind {
    type Err = UnknownMediaKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(MediaKind::File),
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "voice" => Ok(MediaKind::Voice),
            "gif" => Ok(MediaKind::Gif),
            "sticker" => Ok(MediaKind::Sticker),
            other => Err(UnknownMediaKind(other.to_string())),
        }
    }
}

/// Presentation of one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSpec {
    /// Explicit presentation; `None` derives it from the MIME type.
    pub kind: Option<MediaKind>,
    pub mime: String,
    /// Filename attribute; `None` omits it.
    pub file_name: Option<String>,
}

impl MediaSpec {
    pub fn build(&self, file: InputFile) -> InputMedia {
        let mut attributes = Vec::new();
        if let Some(name) = self.file_name.as_deref().filter(|name| !name.is_empty()) {
            attributes.push(DocumentAttribute::Filename {
                file_name: name.to_string(),
            });
        }
        let mut mime = self.mime.clone();
        let mut force_file = false;

        match self.kind {
            Some(MediaKind::File) => force_file = true,
            Some(MediaKind::Video) => attributes.push(DocumentAttribute::Video {
                supports_streaming: true,
            }),
            Some(MediaKind::Audio) => attributes.push(DocumentAttribute::Audio { voice: false }),
            Some(MediaKind::Voice) => attributes.push(DocumentAttribute::Audio { voice: true }),
            Some(MediaKind::Gif) => {
                mime = GIF_MIME.to_string();
                attributes.push(DocumentAttribute::Animated);
            }
            Some(MediaKind::Sticker) => attributes.push(DocumentAttribute::Sticker {
                alt: String::new(),
            }),
            None if mime.starts_with("video") => attributes.push(DocumentAttribute::Video {
                supports_streaming: true,
            }),
            None if mime.starts_with("audio") => {
                attributes.push(DocumentAttribute::Audio { voice: false })
            }
            None if mime == GIF_MIME => attributes.push(DocumentAttribute::Animated),
            None => force_file = true,
        }

        InputMedia::UploadedDocument {
            file,
            mime_type: mime,
            attributes,
            force_file,
        }
    }
}

/// MIME type from the leading bytes of a file.
pub fn detect_mime(head: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", GIF_MIME),
        (b"GIF89a", GIF_MIME),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1a\x45\xdf\xa3", "video/webm"),
        (b"OggS", "audio/ogg"),
        (b"fLaC", "audio/flac"),
        (b"ID3", "audio/mpeg"),
        (b"\xff\xfb", "audio/mpeg"),
        (b"\x1f\x8b", "application/gzip"),
    ];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return *mime;
    }
    if head.len() >= 12 && &head[0..4] == b"RIFF" {
        match &head[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wav",
            b"AVI " => return "video/x-msvideo",
            _ => {}
        }
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return match &head[8..12] {
            b"M4A " => "audio/mp4",
            b"qt  " => "video/quicktime",
            _ => "video/mp4",
        };
    }
    if looks_like_text(head) {
        return "text/plain";
    }
    FALLBACK_MIME
}

fn looks_like_text(head: &[u8]) -> bool {
    // A multi-byte sequence may be cut at the sniff boundary.
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    };
    valid && !head.contains(&0)
}

/// Detect the MIME type of `reader` and rewind it to the start.
pub async fn sniff_mime<R>(reader: &mut R) -> io::Result<&'static str>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut *reader)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;
    reader.seek(SeekFrom::Start(0)).await?;
    Ok(detect_mime(&head))
}
