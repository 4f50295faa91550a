use eyre::{Context, Result};

use crate::cli::InitArgs;
use crate::context::AppContext;
use tg_core::config::Config;

pub fn run_init(ctx: &AppContext, args: &InitArgs) -> Result<()> {
    let config = Config {
        app_id: args.app_id,
        app_hash: args.app_hash.clone(),
        bot_token: args.token.clone(),
        endpoint: None,
    };
    config
        .write_new(&ctx.config_path)
        .wrap_err("writing config")?;
    println!("Wrote config to {}", ctx.config_path.display());
    Ok(())
}
