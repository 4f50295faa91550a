use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::UnboundedSender;

/// Bytes acknowledged so far for one upload.
///
/// Written by the part uploader, read by the heartbeat. The counter only
/// grows, so any read is a (possibly stale) lower bound of real progress.
#[derive(Debug)]
pub struct ProgressState {
    total: u64,
    transferred: AtomicU64,
}

impl ProgressState {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            transferred: AtomicU64::new(0),
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Percent complete in `[0, 100]`; 100 only once every byte is acknowledged.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let done = u128::from(self.transferred().min(self.total));
        (done * 100 / u128::from(self.total)) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { name: String, total: u64 },
    PartAcknowledged { index: u32, bytes: u64 },
    Finished { name: String },
}

/// Optional out-of-process observer of upload progress (e.g. a progress bar).
#[derive(Clone)]
pub struct UploadProgress {
    sender: UnboundedSender<ProgressEvent>,
}

impl UploadProgress {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    pub fn report_started(&self, name: &str, total: u64) {
        let _ = self.sender.send(ProgressEvent::Started {
            name: name.to_string(),
            total,
        });
    }

    pub fn report_part(&self, index: u32, bytes: u64) {
        let _ = self
            .sender
            .send(ProgressEvent::PartAcknowledged { index, bytes });
    }

    pub fn report_finished(&self, name: &str) {
        let _ = self.sender.send(ProgressEvent::Finished {
            name: name.to_string(),
        });
    }
}
