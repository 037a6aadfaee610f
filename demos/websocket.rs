use std::time::Duration;

use courier_http::{ConnectionState, WebSocketClient, WebSocketConfig, WebSocketEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("COURIER_WS_URL")
        .unwrap_or_else(|_| "wss://echo.websocket.org".to_owned());

    let config = WebSocketConfig::new(url)
        .with_first_message_timeout(Duration::from_secs(10))
        .with_ping(Duration::from_secs(15), Duration::from_secs(5))
        .with_ignored_message_types(["heartbeat"])
        .with_reconnect(5, Duration::from_millis(500), Duration::from_secs(10));

    let client = WebSocketClient::new(config)?;
    let mut events = client
        .events()
        .ok_or_else(|| anyhow::anyhow!("event stream already taken"))?;
    client.connect();

    let mut greeted = false;
    while let Some(event) = events.recv().await {
        match event {
            WebSocketEvent::StateChanged(ConnectionState::Connected) if !greeted => {
                client.send_text("hello from courier-http").await?;
                greeted = true;
            }
            WebSocketEvent::StateChanged(state) => println!("state: {state}"),
            WebSocketEvent::Text(text) => {
                println!("text: {text}");
                if text.contains("courier-http") {
                    break;
                }
            }
            WebSocketEvent::Binary(data) => println!("binary: {} byte(s)", data.len()),
            WebSocketEvent::ReconnectScheduled { attempt, delay } => {
                println!("reconnect #{attempt} in {delay:?}");
            }
            WebSocketEvent::GaveUp { reason } => {
                eprintln!("gave up: {reason}");
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}
