mod cli;
mod context;
mod init;
mod progress;
mod send;
mod sticker;
mod upload;

use clap::Parser;
use eyre::{eyre, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Commands};
use crate::context::AppContext;
use tg_core::{InvokeError, UploadError};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    spawn_interrupt_watch(cancel.clone());
    if let Some(timeout) = cli.timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            log::warn!("timeout of {timeout:?} expired, cancelling");
            cancel.cancel();
        });
    }

    let ctx = AppContext::new(&cli, cancel)?;
    let result = match &cli.command {
        Commands::Init(args) => init::run_init(&ctx, args),
        Commands::Send(args) => send::run_send(&ctx, args).await,
        Commands::Upload(args) => upload::run_upload(&ctx, args).await,
        Commands::Sticker { command } => sticker::run_sticker(&ctx, command).await,
    };

    match result {
        Err(err) if is_cancelled(&err) => Err(eyre!("interrupted")),
        other => other,
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn spawn_interrupt_watch(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::debug!("interrupt received, cancelling");
                cancel.cancel();
            }
            Err(err) => log::warn!("failed to listen for interrupt: {err}"),
        }
    });
}

fn is_cancelled(err: &eyre::Report) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<InvokeError>()
            .is_some_and(InvokeError::is_cancelled)
            || cause
                .downcast_ref::<UploadError>()
                .is_some_and(UploadError::is_cancelled)
    })
}
