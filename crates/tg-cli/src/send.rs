use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::{MessageArgs, SendArgs};
use crate::context::AppContext;
use tg_core::rpc::Peer;
use tg_core::Api;

pub async fn run_send(ctx: &AppContext, args: &SendArgs) -> Result<()> {
    let cancel = ctx.cancel.clone();
    ctx.run(|api| async move {
        let target = resolve_target(&api, &cancel, &args.message).await?;
        api.send_message(&cancel, &target, &args.text, &args.message.options())
            .await
            .wrap_err("sending message")?;
        Ok::<(), eyre::Report>(())
    })
    .await
}

/// `--peer` resolved to a peer, or saved messages when absent.
pub async fn resolve_target(
    api: &Api,
    cancel: &CancellationToken,
    message: &MessageArgs,
) -> Result<Peer> {
    match message.peer.as_deref() {
        Some(name) => api
            .resolve_username(cancel, name)
            .await
            .wrap_err_with(|| format!("failed to resolve {name}")),
        None => Ok(Peer::SelfPeer),
    }
}
