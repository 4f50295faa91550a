use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use tg_core::config::{SAMPLE_APP_HASH, SAMPLE_APP_ID, SAMPLE_BOT_TOKEN};
use tg_core::message::MessageOptions;
use tg_core::upload::MediaKind;

#[derive(Parser)]
#[command(name = "tg")]
#[command(about = "Telegram CLI")]
#[command(after_help = "Run '<command> --help' for detailed options on each command.")]
pub struct Cli {
    /// Config file to use
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Use the staging gateway
    #[arg(long, global = true)]
    pub test: bool,
    /// Print every RPC call with its reply and latency
    #[arg(long, global = true)]
    pub debug: bool,
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
    /// Abort the command after this long (e.g. 30s, 5m, 1h30m)
    #[arg(long, global = true, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a sample config file
    Init(InitArgs),
    /// Send a text message
    Send(SendArgs),
    /// Upload a file (or every file under a directory) to a peer
    #[command(alias = "up")]
    Upload(UploadArgs),
    /// Manage sticker sets
    Sticker {
        #[command(subcommand)]
        command: StickerCommand,
    },
}

#[derive(Args, Clone, Debug)]
pub struct InitArgs {
    /// Application id
    #[arg(long, env = "APP_ID", default_value_t = SAMPLE_APP_ID)]
    pub app_id: i32,
    /// Application hash
    #[arg(long, env = "APP_HASH", default_value = SAMPLE_APP_HASH)]
    pub app_hash: String,
    /// Bot token
    #[arg(long, env = "BOT_TOKEN", default_value = SAMPLE_BOT_TOKEN)]
    pub token: String,
}

#[derive(Args, Clone, Debug)]
pub struct MessageArgs {
    /// Peer to write (e.g. channel name or username); saved messages when omitted
    #[arg(long, short = 'p', visible_alias = "target")]
    pub peer: Option<String>,
    /// Use HTML styling
    #[arg(long)]
    pub html: bool,
    /// Send silently (no notifications for the receivers)
    #[arg(long)]
    pub silent: bool,
    /// Disable generation of the webpage preview
    #[arg(long)]
    pub nowebpage: bool,
    /// Schedule the message this far in the future
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub schedule: Option<Duration>,
}

impl MessageArgs {
    pub fn options(&self) -> MessageOptions {
        MessageOptions {
            silent: self.silent,
            no_webpage: self.nowebpage,
            schedule: self.schedule,
            html: self.html,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct SendArgs {
    /// Message text
    pub text: String,
    #[command(flatten)]
    pub message: MessageArgs,
}

#[derive(Args, Clone, Debug)]
pub struct UploadArgs {
    /// File or directory to upload
    pub path: PathBuf,
    #[command(flatten)]
    pub message: MessageArgs,
    /// Filename attribute; an empty value omits it (defaults to the file's name)
    #[arg(long)]
    pub filename: Option<String>,
    /// Document type (file, video, audio, voice, gif, sticker); detected from MIME when omitted
    #[arg(long = "type", visible_alias = "as", value_name = "TYPE")]
    pub kind: Option<MediaKind>,
    /// Number of parts uploaded concurrently
    #[arg(long, short = 'j', default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,
    /// Acknowledge parts strictly in index order even with several threads
    #[arg(long)]
    pub ordered: bool,
    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,
}

#[derive(Subcommand)]
pub enum StickerCommand {
    /// Add a sticker to an existing set
    Add(StickerAddArgs),
    /// Create a new sticker set from one sticker
    Create(StickerCreateArgs),
    /// Remove a sticker from a set
    Remove(StickerRemoveArgs),
}

#[derive(Args, Clone, Debug)]
pub struct StickerSetArg {
    /// Short name of the sticker set (from tg://addstickers?set=short_name)
    #[arg(long = "sticker-set", visible_aliases = ["set", "name"])]
    pub sticker_set: String,
}

#[derive(Args, Clone, Debug)]
pub struct StickerAddArgs {
    /// Sticker image (PNG)
    pub path: PathBuf,
    /// Emoji to associate with the sticker
    #[arg(long, short = 'e')]
    pub emoji: String,
    #[command(flatten)]
    pub set: StickerSetArg,
}

#[derive(Args, Clone, Debug)]
pub struct StickerCreateArgs {
    #[command(flatten)]
    pub sticker: StickerAddArgs,
    /// Sticker set title, 1-64 chars
    #[arg(long, short = 't')]
    pub title: String,
    /// Sticker set owner username
    #[arg(long, short = 'o')]
    pub owner: String,
    /// Create a mask sticker set
    #[arg(long)]
    pub masks: bool,
    /// Create an animated sticker set
    #[arg(long)]
    pub animated: bool,
}

#[derive(Args, Clone, Debug)]
pub struct StickerRemoveArgs {
    /// Index of the sticker to delete
    #[arg(short = 'n')]
    pub index: usize,
    /// Download the sticker to this path before deleting it
    #[arg(long, value_name = "PATH")]
    pub download: Option<PathBuf>,
    #[command(flatten)]
    pub set: StickerSetArg,
}

/// Parse durations such as `45s`, `500ms`, `1h30m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".into());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in {input:?}"))?;
        if digits == 0 {
            return Err(format!("invalid duration {input:?}"));
        }
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in {input:?}"))?;
        rest = &rest[digits..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "d" => 86400.0,
            unit => return Err(format!("unknown unit {unit:?} in {input:?}")),
        };
        rest = &rest[unit_len..];
        let out_of_range = || format!("duration {input:?} out of range");
        let part = Duration::try_from_secs_f64(value * scale).map_err(|_| out_of_range())?;
        total = total.checked_add(part).ok_or_else(out_of_range)?;
    }
    Ok(total)
}
