use std::path::Path;

use eyre::{bail, eyre, Context, Result};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;

use crate::cli::{StickerAddArgs, StickerCommand, StickerCreateArgs, StickerRemoveArgs};
use crate::context::AppContext;
use tg_core::api::{uploaded_document, CreateStickerSet};
use tg_core::download::Downloader;
use tg_core::rpc::{Document, Peer};
use tg_core::upload::{ProgressState, Upload, Uploader, MAX_PART_SIZE};
use tg_core::Api;

const STICKER_MIME: &str = "image/png";

pub async fn run_sticker(ctx: &AppContext, command: &StickerCommand) -> Result<()> {
    match command {
        StickerCommand::Add(args) => run_add(ctx, args).await,
        StickerCommand::Create(args) => run_create(ctx, args).await,
        StickerCommand::Remove(args) => run_remove(ctx, args).await,
    }
}

async fn run_add(ctx: &AppContext, args: &StickerAddArgs) -> Result<()> {
    let cancel = ctx.cancel.clone();
    ctx.run(|api| async move {
        let document = upload_sticker(&api, &cancel, &args.path).await?;
        let set = api
            .add_sticker_to_set(&cancel, &args.set.sticker_set, document.as_input(), &args.emoji)
            .await
            .wrap_err("add to sticker set")?;
        println!("Successfully added sticker to set @{}", set.set.short_name);
        Ok::<(), eyre::Report>(())
    })
    .await
}

async fn run_create(ctx: &AppContext, args: &StickerCreateArgs) -> Result<()> {
    let cancel = ctx.cancel.clone();
    ctx.run(|api| async move {
        let owner = api
            .resolve_username(&cancel, &args.owner)
            .await
            .wrap_err("resolve owner")?;
        if !owner.is_user() {
            bail!("owner {} is not a user", args.owner);
        }

        let sticker = &args.sticker;
        let document = upload_sticker(&api, &cancel, &sticker.path).await?;
        let set = api
            .create_sticker_set(
                &cancel,
                CreateStickerSet {
                    owner: &owner,
                    title: &args.title,
                    short_name: &sticker.set.sticker_set,
                    document: document.as_input(),
                    emoji: &sticker.emoji,
                    masks: args.masks,
                    animated: args.animated,
                },
            )
            .await
            .wrap_err("create set")?;
        println!(
            "Successfully created sticker set @{name}\nTo add: https://t.me/addstickers/{name}",
            name = set.set.short_name
        );
        Ok::<(), eyre::Report>(())
    })
    .await
}

async fn run_remove(ctx: &AppContext, args: &StickerRemoveArgs) -> Result<()> {
    let cancel = ctx.cancel.clone();
    ctx.run(|api| async move {
        let set = api
            .get_sticker_set(&cancel, &args.set.sticker_set)
            .await
            .wrap_err("get sticker set")?;
        let document = pick_sticker(&set.documents, args.index)?;

        if let Some(path) = &args.download {
            Downloader::new(api.clone())
                .to_path(&cancel, document, path)
                .await
                .wrap_err_with(|| format!("download to {:?}", path))?;
        }

        api.remove_sticker_from_set(&cancel, document.as_input())
            .await
            .wrap_err("delete sticker")?;
        println!("Successfully removed sticker from set @{}", set.set.short_name);
        Ok::<(), eyre::Report>(())
    })
    .await
}

fn pick_sticker(documents: &[Document], index: usize) -> Result<&Document> {
    documents.get(index).ok_or_else(|| {
        eyre!(
            "index is too big, there are only {} stickers",
            documents.len()
        )
    })
}

/// Upload a PNG and confirm it as a document without sending it anywhere.
async fn upload_sticker(api: &Api, cancel: &CancellationToken, path: &Path) -> Result<Document> {
    let file = File::open(path)
        .await
        .wrap_err_with(|| format!("open {:?}", path))?;
    let size = file.metadata().await?.len();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let uploader = Uploader::new(api.clone()).with_part_size(MAX_PART_SIZE)?;
    let input = uploader
        .upload(cancel, Upload::new(name, file, size), &ProgressState::new(size))
        .await
        .wrap_err("upload sticker")?;

    api.upload_media(cancel, &Peer::SelfPeer, &uploaded_document(input, STICKER_MIME))
        .await
        .wrap_err("confirm upload")
}
