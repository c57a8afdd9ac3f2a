//! Remote platform access: source trait, HTTP client, progress reporting.

pub mod client;
pub mod source;

pub use client::{PlatformClient, RetryPolicy};
pub use source::{
    list_os_signals, FetchProgress, PlatformError, SignalMeta, SignalPage, SignalSource,
    SilentProgress, StdoutProgress, POWER_POOL_CLASSIFICATION,
};
