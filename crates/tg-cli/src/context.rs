use std::future::Future;
use std::path::PathBuf;

use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use tg_core::config::{self, Config};
use tg_core::invoke::TraceLayer;
use tg_core::{Api, Client, ClientOptions};

/// Global flags and the root cancellation scope of one invocation.
pub struct AppContext {
    pub config_path: PathBuf,
    pub test: bool,
    pub debug: bool,
    pub cancel: CancellationToken,
}

impl AppContext {
    pub fn new(cli: &Cli, cancel: CancellationToken) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => config::default_config_path()?,
        };
        Ok(Self {
            config_path,
            test: cli.test,
            debug: cli.debug,
            cancel,
        })
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_path)
            .with_context(|| format!("loading config {}", self.config_path.display()))
    }

    /// Connect and authorize, run `f`, then shut the client down whatever `f` returned.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Api) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = self.load_config()?;
        let trace = self.debug.then(TraceLayer::stdout);
        let options = ClientOptions::from_config(&config, self.test)
            .with_session_path(config.session_path(&self.config_path))
            .with_trace(trace);
        log::debug!("connecting to {}", options.endpoint);

        let client = Client::connect(&self.cancel, options)
            .await
            .wrap_err("connecting")?;
        let result = f(client.api().clone()).await;
        client.shutdown().await;
        result
    }
}
