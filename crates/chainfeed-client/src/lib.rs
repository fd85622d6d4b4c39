/*
[INPUT]:  Public API exports for the chainfeed-client crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod feed;
pub mod refresh;
pub mod registry;

// Re-export main types for convenience
pub use config::{FeedConfig, SubscriptionConfig};
pub use feed::LiveChainFeed;
pub use refresh::{DEFAULT_REFRESH_INTERVAL, RefreshScheduler};
pub use registry::{ConnectionState, FeedView, SendOutcome, SubscriptionRegistry};
