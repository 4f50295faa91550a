//! Chunked document download.

use std::path::Path;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::api::Api;
use crate::errors::InvokeError;
use crate::rpc::Document;

/// Largest chunk `upload.getFile` returns.
pub const MAX_CHUNK: u32 = 512 * 1024;

pub struct Downloader {
    api: Api,
    chunk: u32,
}

impl Downloader {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            chunk: MAX_CHUNK,
        }
    }

    /// Stream `document` into `writer`, returning the bytes written.
    ///
    /// Stops at the first short chunk, so documents with an unknown size
    /// still terminate.
    pub async fn stream<W>(
        &self,
        cancel: &CancellationToken,
        document: &Document,
        writer: &mut W,
    ) -> Result<u64, InvokeError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut offset = 0u64;
        loop {
            let bytes = self.api.get_file(cancel, document, offset, self.chunk).await?;
            if !bytes.is_empty() {
                writer.write_all(&bytes).await?;
                offset += bytes.len() as u64;
            }
            let finished = (bytes.len() as u64) < u64::from(self.chunk)
                || (document.size > 0 && offset >= document.size);
            if finished {
                break;
            }
        }
        writer.flush().await?;
        log::debug!("downloaded document {} ({offset} bytes)", document.id);
        Ok(offset)
    }

    /// Download `document` to `path`, replacing any existing file.
    pub async fn to_path(
        &self,
        cancel: &CancellationToken,
        document: &Document,
        path: &Path,
    ) -> Result<u64, InvokeError> {
        let mut file = tokio::fs::File::create(path).await?;
        self.stream(cancel, document, &mut file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::mock::ScriptedInvoker;
    use crate::rpc::Response;
    use serde_json::json;
    use std::sync::Arc;

    fn document(size: u64) -> Document {
        Document {
            id: 5,
            access_hash: 6,
            file_reference: String::new(),
            mime_type: "image/png".into(),
            size,
        }
    }

    #[tokio::test]
    async fn reads_chunks_until_short_read() {
        // "abcd", "ef"
        let transport = Arc::new(ScriptedInvoker::new(vec![
            Ok(Response(json!({"bytes": "YWJjZA=="}))),
            Ok(Response(json!({"bytes": "ZWY="}))),
        ]));
        let downloader = Downloader::new(Api::new(transport.clone()));
        let downloader = Downloader {
            chunk: 4,
            ..downloader
        };

        let mut out = Vec::new();
        let written = downloader
            .stream(&CancellationToken::new(), &document(0), &mut out)
            .await
            .unwrap();

        assert_eq!(written, 6);
        assert_eq!(out, b"abcdef");
        let calls = transport.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1.params["offset"], json!(4));
    }

    #[tokio::test]
    async fn stops_at_known_size() {
        let transport = Arc::new(ScriptedInvoker::new(vec![Ok(Response(
            json!({"bytes": "YWJjZA=="}),
        ))]));
        let downloader = Downloader {
            chunk: 4,
            ..Downloader::new(Api::new(transport.clone()))
        };
        let mut out = Vec::new();
        downloader
            .stream(&CancellationToken::new(), &document(4), &mut out)
            .await
            .unwrap();
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn writes_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sticker.png");
        let transport = Arc::new(ScriptedInvoker::new(vec![Ok(Response(
            json!({"bytes": "aGVsbG8="}),
        ))]));
        let written = Downloader::new(Api::new(transport))
            .to_path(&CancellationToken::new(), &document(5), &path)
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }
}
