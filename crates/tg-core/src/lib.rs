pub mod api;
pub mod client;
pub mod config;
pub mod download;
pub mod errors;
pub mod invoke;
pub mod message;
pub mod rpc;
pub mod transport;
pub mod upload;

pub use api::Api;
pub use client::{Client, ClientOptions};
pub use errors::{InvokeError, UploadError};
