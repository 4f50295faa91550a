use std::path::Path;

use eyre::{bail, Context, Result};
use tokio::fs::File;
use walkdir::WalkDir;

use crate::cli::UploadArgs;
use crate::context::AppContext;
use crate::progress::spawn_progress_monitor;
use crate::send::resolve_target;
use tg_core::upload::{sniff_mime, MediaMessage, MediaSpec, Upload, Uploader, MAX_PART_SIZE};

pub async fn run_upload(ctx: &AppContext, args: &UploadArgs) -> Result<()> {
    if !args.path.exists() {
        bail!("{} does not exist", args.path.display());
    }
    let cancel = ctx.cancel.clone();

    ctx.run(|api| async move {
        let target = resolve_target(&api, &cancel, &args.message).await?;
        let (progress, monitor) = spawn_progress_monitor(args.progress);

        let mut uploader = Uploader::new(api)
            .with_part_size(MAX_PART_SIZE)?
            .with_threads(usize::from(args.threads))
            .with_ordered(args.ordered);
        if let Some(progress) = progress {
            uploader = uploader.with_progress(progress);
        }

        let result = async {
            for entry in WalkDir::new(&args.path).follow_links(true).sort_by_file_name() {
                let entry = entry.wrap_err("walking upload path")?;
                if !entry.file_type().is_file() {
                    continue;
                }
                match args.message.peer.as_deref() {
                    Some(peer) => println!("Uploading {} to {peer}", entry.path().display()),
                    None => println!("Saving {} to favorites", entry.path().display()),
                }

                let mut file = File::open(entry.path())
                    .await
                    .wrap_err_with(|| format!("open {:?}", entry.path()))?;
                let size = file.metadata().await?.len();
                let mime = sniff_mime(&mut file)
                    .await
                    .wrap_err_with(|| format!("detect MIME of {:?}", entry.path()))?;
                let name = file_name(entry.path());
                log::debug!("{name}: {size} bytes, {mime}");

                let message = MediaMessage {
                    target: target.clone(),
                    media: MediaSpec {
                        kind: args.kind,
                        mime: mime.to_string(),
                        file_name: filename_attribute(args.filename.as_deref(), &name),
                    },
                    caption: name.clone(),
                    options: args.message.options(),
                };
                uploader
                    .send(&cancel, Upload::new(name, file, size), &message)
                    .await
                    .wrap_err_with(|| format!("upload {:?}", entry.path()))?;
            }
            Ok::<(), eyre::Report>(())
        }
        .await;

        drop(uploader);
        if let Some(monitor) = monitor {
            if let Err(err) = monitor.await {
                log::warn!("progress monitor failed: {err}");
            }
        }
        result
    })
    .await
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `--filename` wins when given; an empty value drops the attribute.
fn filename_attribute(flag: Option<&str>, base_name: &str) -> Option<String> {
    match flag {
        Some("") => None,
        Some(name) => Some(name.to_string()),
        None => Some(base_name.to_string()),
    }
}
