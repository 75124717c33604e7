use std::time::{Duration, Instant};

use actix_ws::Message;
use chatterbox_chat::models::ChatPayload;
use futures_util::{
    future::{select, Either},
    StreamExt as _,
};
use log::{debug, error, info};
use tokio::{pin, sync::mpsc, time::interval};

use crate::ws::server::ChatServerHandle;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay chat messages between one client and the hub, respond to ping
/// messages, and monitor connection health to detect network issues and
/// free up resources.
pub async fn chat_ws(
    chat_server: ChatServerHandle,
    mut session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let mut last_heartbeat = Instant::now();
    let mut interval = interval(HEARTBEAT_INTERVAL);

    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();

    let conn_id = chat_server.connect(conn_tx).await;

    debug!("Connection id: {conn_id}");

    let close_reason = loop {
        // most of the futures we process need to be stack-pinned to work with select()

        let tick = interval.tick();
        pin!(tick);

        let msg_rx = conn_rx.recv();
        pin!(msg_rx);

        let messages = select(msg_stream.next(), msg_rx);
        pin!(messages);

        match select(messages, tick).await {
            // messages received from the client
            Either::Left((Either::Left((Some(Ok(msg)), _)), _)) => match msg {
                Message::Ping(bytes) => {
                    last_heartbeat = Instant::now();
                    if session.pong(&bytes).await.is_err() {
                        break None;
                    }
                }

                Message::Pong(_) => {
                    last_heartbeat = Instant::now();
                }

                Message::Text(text) => {
                    last_heartbeat = Instant::now();

                    let text: &str = text.as_ref();
                    match serde_json::from_str::<ChatPayload>(text) {
                        Ok(payload) => {
                            if let Err(err) = chat_server
                                .send_chat(payload.username, payload.message)
                                .await
                            {
                                error!("Failed to relay message from {conn_id}: {err:?}");
                                break None;
                            }
                        }
                        Err(err) => {
                            error!("Invalid payload from {conn_id}: {err:?}");
                            break None;
                        }
                    }
                }

                Message::Close(reason) => break reason,

                _ => {
                    break None;
                }
            },

            // client WebSocket stream error
            Either::Left((Either::Left((Some(Err(err)), _)), _)) => {
                error!("{err}");
                break None;
            }

            // client WebSocket stream ended
            Either::Left((Either::Left((None, _)), _)) => break None,

            // broadcast messages from the hub
            Either::Left((Either::Right((Some(chat_msg), _)), _)) => {
                if session.text(chat_msg).await.is_err() {
                    break None;
                }
            }

            // the hub dropped this connection's sender; it has shut down
            Either::Left((Either::Right((None, _)), _)) => {
                error!("Connection {conn_id} lost its hub sender");
                break None;
            }

            // heartbeat interval tick
            Either::Right((_inst, _)) => {
                // if no heartbeat ping/pong received recently, close the connection
                if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
                    info!(
                        "client has not sent heartbeat in over {CLIENT_TIMEOUT:?}; disconnecting"
                    );
                    break None;
                }

                // send heartbeat ping
                let _ = session.ping(b"").await;
            }
        };
    };

    chat_server.disconnect(conn_id).await;

    // attempt to close connection gracefully
    let _ = session.close(close_reason).await;
}
