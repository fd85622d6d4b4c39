/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public chain feed adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod backoff;
pub mod error;
pub mod types;
pub mod ws;

pub use backoff::{BackoffSchedule, DEFAULT_RECONNECT_DELAYS_MS};
pub use error::{ChainFeedError, Result};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ChannelTransport,
    HubWebSocket,
    InboundMessage,
    RecordingHandle,
    RecordingTransport,
    SendFuture,
    TransportCall,
    TransportEvent,
};
