//! Castdesk - fan-out publishing of social posts
//!
//! This library publishes one post to many connected social accounts
//! across platforms. Platform adapters implement a common [`Publisher`]
//! contract, a [`PublisherRegistry`] routes each platform to its adapter,
//! and the [`Dispatcher`] refreshes tokens, publishes concurrently and
//! aggregates one [`DispatchReport`] with a result for every account.
//!
//! [`Publisher`]: platforms::Publisher

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod registry;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{DispatchOptions, Dispatcher, RetryPolicy};
pub use error::{CastdeskError, ErrorKind, PlatformError, RegistryError, Result};
pub use registry::PublisherRegistry;
pub use report::{DispatchReport, DispatchStatus, PublishResult};
pub use types::{Account, AccountRecord, MediaKind, MediaRef, Post};
