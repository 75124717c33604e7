//! The broadcast hub: owns the live-connection registry and the message log.

use std::{collections::HashMap, io};

use chatterbox_chat::{log::MessageLog, models::Message};
use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::ws::{ConnId, Msg};

/// How many commands may be queued before producers are made to wait for
/// the delivery loop to catch up.
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// A command received by the [`ChatServer`].
#[derive(Debug)]
enum Command {
    Connect {
        conn_tx: mpsc::UnboundedSender<Msg>,
        res_tx: oneshot::Sender<ConnId>,
    },

    Disconnect {
        conn: ConnId,
    },

    Chat {
        username: String,
        message: String,
        res_tx: oneshot::Sender<Message>,
    },

    History {
        res_tx: oneshot::Sender<Vec<Message>>,
    },
}

#[derive(Debug, Error)]
pub enum ChatServerError {
    #[error("Chat server has stopped")]
    Stopped,
}

/// The chat relay hub.
///
/// Accepting a message (assigning its ID and appending it to the log) and
/// fanning it out to every live connection happen in a single turn of the
/// [`run`](Self::run) loop, so every connection observes messages in log
/// order.
///
/// Call and spawn [`run`](Self::run) to start processing commands.
#[derive(Debug)]
pub struct ChatServer {
    /// Map of connection IDs to their outbound frame senders.
    sessions: HashMap<ConnId, mpsc::UnboundedSender<Msg>>,

    /// Accepted message history, in acceptance order.
    log: MessageLog,

    /// Next connection ID to hand out.
    next_conn_id: ConnId,

    /// Command receiver.
    cmd_rx: mpsc::Receiver<Command>,
}

impl ChatServer {
    pub fn new() -> (Self, ChatServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        (
            Self {
                sessions: HashMap::new(),
                log: MessageLog::new(),
                next_conn_id: 1,
                cmd_rx,
            },
            ChatServerHandle { cmd_tx },
        )
    }

    /// Register a new session and assign a unique ID to it.
    fn connect(&mut self, conn_tx: mpsc::UnboundedSender<Msg>) -> ConnId {
        let id = self.next_conn_id;
        self.next_conn_id += 1;

        self.sessions.insert(id, conn_tx);

        info!("Connection {id} joined ({} live)", self.sessions.len());

        id
    }

    /// Unregister a session. Safe to call twice: the reader loop and a
    /// failed fan-out write may both decide to drop the same connection.
    fn disconnect(&mut self, conn_id: ConnId) {
        if self.sessions.remove(&conn_id).is_some() {
            info!("Connection {conn_id} left ({} live)", self.sessions.len());
        }
    }

    /// Accept a message: append it to the log, then deliver it to every
    /// live session.
    fn chat(&mut self, username: String, message: String) -> Message {
        let accepted = self.log.append(username, message);

        match serde_json::to_string(&accepted) {
            Ok(frame) => self.broadcast(&frame),
            Err(err) => error!("Failed to encode message {}: {err:?}", accepted.id),
        }

        accepted
    }

    /// Send one frame to every live session. Sessions whose channel is gone
    /// are unregistered in the same pass; the remaining sessions still
    /// receive the frame.
    fn broadcast(&mut self, frame: &str) {
        let mut dead = Vec::new();

        for (conn_id, conn_tx) in &self.sessions {
            // errors if the connection task already exited
            if conn_tx.send(frame.to_string()).is_err() {
                dead.push(*conn_id);
            }
        }

        for conn_id in dead {
            debug!("Dropping connection {conn_id}: send failed");
            self.disconnect(conn_id);
        }
    }

    pub async fn run(mut self) -> io::Result<()> {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Connect { conn_tx, res_tx } => {
                    if let Err(error) = res_tx.send(self.connect(conn_tx)) {
                        error!("Failed to connect {error:?}");
                    }
                }

                Command::Disconnect { conn } => self.disconnect(conn),

                Command::Chat {
                    username,
                    message,
                    res_tx,
                } => {
                    // the message stays accepted even if the producer has
                    // since gone away
                    let _ = res_tx.send(self.chat(username, message));
                }

                Command::History { res_tx } => {
                    let _ = res_tx.send(self.log.snapshot());
                }
            }
        }

        Ok(())
    }
}

/// Handle and command sender for the chat server.
///
/// Reduces boilerplate of setting up response channels in WebSocket and API
/// handlers.
#[derive(Debug, Clone)]
pub struct ChatServerHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ChatServerHandle {
    /// Register client message sender and obtain connection ID.
    pub async fn connect(&self, conn_tx: mpsc::UnboundedSender<Msg>) -> ConnId {
        let (res_tx, res_rx) = oneshot::channel();

        // unwrap: chat server should not have been dropped
        self.cmd_tx
            .send(Command::Connect { conn_tx, res_tx })
            .await
            .unwrap();

        // unwrap: chat server does not drop our response channel
        res_rx.await.unwrap()
    }

    /// Unregister message sender.
    pub async fn disconnect(&self, conn: ConnId) {
        // unwrap: chat server should not have been dropped
        self.cmd_tx
            .send(Command::Disconnect { conn })
            .await
            .unwrap();
    }

    /// Accept a message and broadcast it to every live connection. Returns
    /// the accepted message, with its assigned ID.
    pub async fn send_chat(
        &self,
        username: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Message, ChatServerError> {
        let (res_tx, res_rx) = oneshot::channel();

        self.cmd_tx
            .send(Command::Chat {
                username: username.into(),
                message: message.into(),
                res_tx,
            })
            .await
            .map_err(|_| ChatServerError::Stopped)?;

        res_rx.await.map_err(|_| ChatServerError::Stopped)
    }

    /// Fetch the full accepted-message history.
    pub async fn history(&self) -> Result<Vec<Message>, ChatServerError> {
        let (res_tx, res_rx) = oneshot::channel();

        self.cmd_tx
            .send(Command::History { res_tx })
            .await
            .map_err(|_| ChatServerError::Stopped)?;

        res_rx.await.map_err(|_| ChatServerError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn spawn_server() -> ChatServerHandle {
        let (server, handle) = ChatServer::new();
        tokio::spawn(server.run());
        handle
    }

    fn decode(frame: &str) -> Message {
        serde_json::from_str(frame).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn every_connection_receives_every_message_in_order() {
        let handle = spawn_server();

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        handle.connect(a_tx).await;
        handle.connect(b_tx).await;

        for i in 0..10 {
            handle
                .send_chat("alice", format!("message {i}"))
                .await
                .unwrap();
        }

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 10);

        for rx in [&mut a_rx, &mut b_rx] {
            for expected in &history {
                assert_eq!(&decode(&rx.recv().await.unwrap()), expected);
            }
        }
    }

    #[test_log::test(tokio::test)]
    async fn concurrent_producers_observe_one_global_order() {
        let handle = spawn_server();

        let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
        handle.connect(conn_tx).await;

        let mut producers = Vec::new();
        for producer in 0..4 {
            let handle = handle.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..25 {
                    handle
                        .send_chat(format!("producer-{producer}"), format!("message {i}"))
                        .await
                        .unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        let history = handle.history().await.unwrap();
        assert_eq!(history.len(), 100);

        let mut ids: Vec<&str> = history.iter().map(|msg| msg.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 100);

        for expected in &history {
            assert_eq!(&decode(&conn_rx.recv().await.unwrap()), expected);
        }
    }

    #[test_log::test(tokio::test)]
    async fn dead_connection_does_not_stall_other_recipients() {
        let handle = spawn_server();

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        handle.connect(a_tx).await;
        handle.connect(b_tx).await;
        handle.connect(c_tx).await;

        // B's connection task dies abruptly, without a disconnect
        drop(b_rx);

        let first = handle.send_chat("x", "hi").await.unwrap();
        let second = handle.send_chat("x", "still here").await.unwrap();

        for rx in [&mut a_rx, &mut c_rx] {
            assert_eq!(decode(&rx.recv().await.unwrap()), first);
            assert_eq!(decode(&rx.recv().await.unwrap()), second);
        }
    }

    #[test_log::test(tokio::test)]
    async fn unregistering_twice_is_harmless() {
        let handle = spawn_server();

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, _b_rx) = mpsc::unbounded_channel();
        handle.connect(a_tx).await;
        let b = handle.connect(b_tx).await;

        handle.disconnect(b).await;
        handle.disconnect(b).await;

        let accepted = handle.send_chat("x", "hi").await.unwrap();

        assert_eq!(decode(&a_rx.recv().await.unwrap()), accepted);
    }

    #[test_log::test(tokio::test)]
    async fn history_matches_what_producers_were_told() {
        let handle = spawn_server();

        let first = handle.send_chat("x", "hi").await.unwrap();
        let second = handle.send_chat("", "").await.unwrap();

        assert_eq!(first.id, "1");
        assert_eq!(second.id, "2");
        assert_eq!(handle.history().await.unwrap(), vec![first, second]);
    }
}
