/*
[INPUT]:  Hub URL, instrument and expiry from the command line
[OUTPUT]: Raw transport events printed as they arrive
[POS]:    Examples - driving HubWebSocket without the subscription registry
[UPDATE]: When the ChannelTransport contract changes
*/

use chainfeed_adapter::*;
use tokio::time::{Duration, sleep};

/// Example: open a hub channel, subscribe one key and print what comes back.
///
/// Usage: cargo run --example hub_stream_example -- <ws-url> <instrument> <expiry>
#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:5000/hubs/option-chain".to_string());
    let key = SubscriptionKey::new(
        args.next().unwrap_or_else(|| "NIFTY50".to_string()),
        args.next().unwrap_or_else(|| "2025-01-30".to_string()),
    )?;

    println!("=== Hub Stream Example ===\n");

    let mut ws = HubWebSocket::new(&url)?;
    let mut events = ws.take_events().expect("events taken once");
    ws.open().await?;
    println!("✓ Connecting to {url}");

    let run = async {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Opened | TransportEvent::Reconnected => {
                    println!("✓ {event:?}, subscribing {key}");
                    // each connection starts with no subscriptions
                    let subscribe = ws.send(HubMethod::Subscribe, key.to_args());
                    let refresh = ws.send(HubMethod::Refresh, key.to_args());
                    if let Err(err) = subscribe.await {
                        println!("✗ subscribe failed: {err}");
                    }
                    let _ = refresh.await;
                }
                TransportEvent::Closed => println!("✗ channel closed, waiting for reconnect"),
                TransportEvent::Message(InboundMessage::Update { key, payload }) => {
                    println!("← {key}: {payload}");
                }
                TransportEvent::Message(InboundMessage::Error { key, message }) => {
                    println!("← {key} error: {message}");
                }
            }
        }
    };

    tokio::select! {
        _ = run => {}
        _ = sleep(Duration::from_secs(60)) => println!("\nStopping after 60 seconds"),
    }

    ws.close().await;
    println!("✓ Channel closed");
    Ok(())
}
