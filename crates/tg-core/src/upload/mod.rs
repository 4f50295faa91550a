//! Chunked upload orchestration.
//!
//! A byte stream of known length is split into fixed-size parts that are
//! uploaded through the invoker chain under one session id. While parts are
//! in flight a heartbeat reports progress to the destination; once every part
//! is acknowledged the assembled file is attached to an outgoing message.

pub mod heartbeat;
pub mod media;
pub mod progress;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::api::Api;
use crate::errors::UploadError;
use crate::message::MessageOptions;
use crate::rpc::{InputFile, Peer, Response};

pub use heartbeat::{run_heartbeat, HEARTBEAT_INTERVAL};
pub use media::{sniff_mime, MediaKind, MediaSpec};
pub use progress::{ProgressEvent, ProgressState, UploadProgress};

/// Largest part the protocol accepts.
pub const MAX_PART_SIZE: usize = 512 * 1024;
/// Files above this size use the big-file part call.
pub const BIG_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;
/// Largest part count of a single file.
pub const MAX_PARTS: u64 = 4000;

/// Validate a part size against the protocol: a positive multiple of 1 KiB
/// that evenly divides the maximum part size.
pub fn check_part_size(part_size: usize) -> Result<usize, UploadError> {
    if part_size == 0 || part_size % 1024 != 0 || MAX_PART_SIZE % part_size != 0 {
        return Err(UploadError::InvalidPartSize(part_size));
    }
    Ok(part_size)
}

/// Number of parts needed for `size` bytes.
pub fn part_count(size: u64, part_size: usize) -> u64 {
    size.div_ceil(part_size as u64)
}

/// A byte source of known length to be uploaded under `name`.
pub struct Upload<R> {
    name: String,
    reader: R,
    size: u64,
}

impl<R> Upload<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(name: impl Into<String>, reader: R, size: u64) -> Self {
        Self {
            name: name.into(),
            reader,
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Fixed facts about one upload session, shared by every part.
#[derive(Debug, Clone, Copy)]
struct SessionInfo {
    file_id: i64,
    total_parts: u32,
    big: bool,
}

struct Part {
    index: u32,
    bytes: Vec<u8>,
}

/// Splits one stream into parts; lives until every part is acknowledged.
struct UploadSession<R> {
    upload: Upload<R>,
    info: SessionInfo,
    part_size: usize,
    next_index: u32,
    remaining: u64,
}

impl<R> UploadSession<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn new(upload: Upload<R>, part_size: usize) -> Result<Self, UploadError> {
        let part_size = check_part_size(part_size)?;
        if upload.size == 0 {
            return Err(UploadError::Empty);
        }
        let parts = part_count(upload.size, part_size);
        if parts > MAX_PARTS {
            return Err(UploadError::TooLarge {
                size: upload.size,
                parts,
                max: MAX_PARTS,
            });
        }
        let info = SessionInfo {
            file_id: rand::thread_rng().gen(),
            total_parts: parts as u32,
            big: upload.size > BIG_FILE_THRESHOLD,
        };
        let remaining = upload.size;
        Ok(Self {
            upload,
            info,
            part_size,
            next_index: 0,
            remaining,
        })
    }

    async fn next_part(&mut self) -> Result<Option<Part>, UploadError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let index = self.next_index;
        let len = self.remaining.min(self.part_size as u64) as usize;
        let mut bytes = vec![0u8; len];
        self.upload
            .reader
            .read_exact(&mut bytes)
            .await
            .map_err(|source| UploadError::Read { index: u64::from(index), source })?;

        self.next_index += 1;
        self.remaining -= len as u64;
        Ok(Some(Part { index, bytes }))
    }

    fn input_file(&self) -> InputFile {
        let (id, parts, name) = (
            self.info.file_id,
            self.info.total_parts,
            self.upload.name.clone(),
        );
        if self.info.big {
            InputFile::Big { id, parts, name }
        } else {
            InputFile::Small { id, parts, name }
        }
    }
}

/// Uploads files in parts through an [`Api`].
#[derive(Clone)]
pub struct Uploader {
    api: Api,
    part_size: usize,
    threads: usize,
    ordered: bool,
    progress: Option<UploadProgress>,
}

impl Uploader {
    pub fn new(api: Api) -> Self {
        Self {
            api,
            part_size: MAX_PART_SIZE,
            threads: 1,
            ordered: false,
            progress: None,
        }
    }

    pub fn with_part_size(mut self, part_size: usize) -> Result<Self, UploadError> {
        self.part_size = check_part_size(part_size)?;
        Ok(self)
    }

    /// Parts in flight at once; 1 uploads strictly in index order.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Require index-order acknowledgement regardless of thread count.
    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn with_progress(mut self, progress: UploadProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    fn concurrency(&self) -> usize {
        if self.ordered {
            1
        } else {
            self.threads
        }
    }

    /// Upload every part of `upload` and return the assembled file reference.
    pub async fn upload<R>(
        &self,
        cancel: &CancellationToken,
        upload: Upload<R>,
        state: &ProgressState,
    ) -> Result<InputFile, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut session = UploadSession::new(upload, self.part_size)?;
        let info = session.info;
        if let Some(progress) = &self.progress {
            progress.report_started(session.upload.name(), session.upload.size());
        }
        log::debug!(
            "uploading {} ({} bytes) as {} part(s) of {} bytes, {} in flight",
            session.upload.name(),
            session.upload.size(),
            info.total_parts,
            self.part_size,
            self.concurrency()
        );

        let concurrency = self.concurrency();
        if concurrency == 1 {
            while let Some(part) = session.next_part().await? {
                self.send_part(cancel, info, part, state).await?;
            }
        } else {
            let mut in_flight = FuturesUnordered::new();
            let mut exhausted = false;
            loop {
                while !exhausted && in_flight.len() < concurrency {
                    match session.next_part().await? {
                        Some(part) => in_flight.push(self.send_part(cancel, info, part, state)),
                        None => exhausted = true,
                    }
                }
                match in_flight.next().await {
                    Some(result) => result?,
                    None => break,
                }
            }
        }

        if let Some(progress) = &self.progress {
            progress.report_finished(session.upload.name());
        }
        Ok(session.input_file())
    }

    async fn send_part(
        &self,
        cancel: &CancellationToken,
        info: SessionInfo,
        part: Part,
        state: &ProgressState,
    ) -> Result<(), UploadError> {
        let Part { index, bytes } = part;
        let len = bytes.len() as u64;
        let sent = if info.big {
            self.api
                .save_big_file_part(cancel, info.file_id, index, info.total_parts, bytes)
                .await
        } else {
            self.api
                .save_file_part(cancel, info.file_id, index, bytes)
                .await
        };
        sent.map_err(|source| UploadError::Part {
            index: u64::from(index),
            source,
        })?;

        state.advance(len);
        if let Some(progress) = &self.progress {
            progress.report_part(index, len);
        }
        Ok(())
    }

    /// Upload `upload` and send it to `message.target`, reporting progress to
    /// the target while the upload runs.
    ///
    /// The part upload (followed by the attach call) and the heartbeat run as
    /// two joined tasks; the first failure cancels the other.
    pub async fn send<R>(
        &self,
        cancel: &CancellationToken,
        upload: Upload<R>,
        message: &MediaMessage,
    ) -> Result<Response, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let state = ProgressState::new(upload.size());
        let scope = cancel.child_token();
        let done = CancellationToken::new();

        let transfer = async {
            let result = async {
                let file = self.upload(&scope, upload, &state).await?;
                let media = message.media.build(file);
                let sent = self
                    .api
                    .send_media(&scope, &message.target, &media, &message.caption, &message.options)
                    .await?;
                Ok::<_, UploadError>(sent)
            }
            .await;
            done.cancel();
            if result.is_err() {
                scope.cancel();
            }
            result
        };

        let beat = async {
            let result = run_heartbeat(
                &self.api,
                &scope,
                &done,
                &message.target,
                &state,
                HEARTBEAT_INTERVAL,
            )
            .await;
            if result.is_err() {
                scope.cancel();
            }
            result.map_err(UploadError::from)
        };

        let (sent, ()) = tokio::try_join!(transfer, beat)?;
        Ok(sent)
    }
}

/// Destination and presentation of an uploaded file.
#[derive(Debug, Clone)]
pub struct MediaMessage {
    pub target: Peer,
    pub media: MediaSpec,
    pub caption: String,
    pub options: MessageOptions,
}
