//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with streaming downloads via `tokio-util`
//! - `FileSystemAccess` using `tokio::fs`
//! - `BackgroundExecutor` using spawned Tokio tasks
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioBackgroundExecutor, TokioFileSystem};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = Arc::new(ReqwestHttpClient::new());
//!     let fs = Arc::new(TokioFileSystem::new());
//!     let executor = Arc::new(TokioBackgroundExecutor::new());
//!
//!     // Hand these to CoreConfig::builder()
//! }
//! ```

mod background;
mod filesystem;
mod http;

pub use background::TokioBackgroundExecutor;
pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
