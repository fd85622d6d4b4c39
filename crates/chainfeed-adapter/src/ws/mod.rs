/*
[INPUT]:  Hub URL, reconnect schedule and hub method calls
[OUTPUT]: Channel transports delivering connectivity and push events
[POS]:    WebSocket layer - persistent channel to the option-chain hub
[UPDATE]: When adding transports or changing the channel contract
*/

pub mod client;
pub mod message;
pub mod recording;
pub mod transport;

pub use client::{DEFAULT_INVOCATION_TIMEOUT, HubWebSocket};
pub use message::{ClientFrame, ServerFrame};
pub use recording::{RecordingHandle, RecordingTransport, TransportCall};
pub use transport::{ChannelTransport, InboundMessage, SendFuture, TransportEvent};
