use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tg_core::upload::{ProgressEvent, UploadProgress};

const BAR_TEMPLATE: &str =
    "{msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Render upload progress events as one byte bar per file.
///
/// The task ends once every clone of the returned [`UploadProgress`] is dropped.
pub fn spawn_progress_monitor(enabled: bool) -> (Option<UploadProgress>, Option<JoinHandle<()>>) {
    if !enabled {
        return (None, None);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let progress = UploadProgress::new(tx);
    let join = tokio::spawn(async move {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let mut bar: Option<ProgressBar> = None;

        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Started { name, total } => {
                    let pb = ProgressBar::new(total);
                    pb.set_style(style.clone());
                    pb.set_message(format!("upload {name}"));
                    if let Some(previous) = bar.replace(pb) {
                        previous.abandon();
                    }
                }
                ProgressEvent::PartAcknowledged { bytes, .. } => {
                    if let Some(pb) = &bar {
                        pb.inc(bytes);
                    }
                }
                ProgressEvent::Finished { .. } => {
                    if let Some(pb) = bar.take() {
                        pb.finish();
                    }
                }
            }
        }

        // Upload failed or was cancelled midway.
        if let Some(pb) = bar {
            pb.abandon();
        }
    });

    (Some(progress), Some(join))
}
