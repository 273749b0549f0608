//! tests/common/harness.rs
//!
//! An in-memory echo service behind the public transport traits. It answers
//! the handshake, echoes request/response and streaming operations, and can
//! be shut down to simulate the transport going away.

use async_trait::async_trait;
use eventstream_rpc::{
    ClientConnection, ClientConnectionConfig, ConnectionBuilder, Message, MessageType, StreamEnd,
    TransportConnection, TransportDisconnect, TransportError, TransportStream,
    config::TransportOptions,
    operations::json::SERVICE_MODEL_TYPE_HEADER,
};
use std::sync::{
    Arc, Mutex, Once,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::{mpsc, watch};

pub const VERSION_HEADER: &str = ":version";
pub const PROTOCOL_VERSION: &str = "0.1.0";

pub const ECHO_MESSAGE: &str = "awstest#EchoMessage";
pub const ECHO_STREAM_MESSAGES: &str = "awstest#EchoStreamMessages";
pub const CAUSE_SERVICE_ERROR: &str = "awstest#CauseServiceError";

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "eventstream_rpc=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Server-side state shared by every connection the builder creates.
#[derive(Debug)]
pub struct EchoServer {
    disconnect_tx: watch::Sender<Option<TransportDisconnect>>,
    terminations: AtomicUsize,
    streams_closed: AtomicUsize,
}

impl EchoServer {
    pub fn new() -> Arc<Self> {
        let (disconnect_tx, _) = watch::channel(None);
        Arc::new(Self {
            disconnect_tx,
            terminations: AtomicUsize::new(0),
            streams_closed: AtomicUsize::new(0),
        })
    }

    /// Drops every connection with `error_code`.
    pub fn shutdown(&self, error_code: i32) {
        self.disconnect_tx
            .send_replace(Some(TransportDisconnect { error_code }));
    }

    /// Stream termination messages received from clients.
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn streams_closed(&self) -> usize {
        self.streams_closed.load(Ordering::SeqCst)
    }
}

pub struct EchoBuilder {
    pub server: Arc<EchoServer>,
}

impl ConnectionBuilder for EchoBuilder {
    type Connection = EchoConnection;

    fn build(&self, _options: &TransportOptions) -> Result<EchoConnection, TransportError> {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        Ok(EchoConnection {
            server: Arc::clone(&self.server),
            ack_tx,
            ack_rx: tokio::sync::Mutex::new(ack_rx),
        })
    }
}

pub struct EchoConnection {
    server: Arc<EchoServer>,
    ack_tx: mpsc::UnboundedSender<Message>,
    ack_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

#[async_trait]
impl TransportConnection for EchoConnection {
    type Stream = EchoStream;

    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_protocol_message(&self, message: Message) -> Result<(), TransportError> {
        if message.message_type != MessageType::Connect {
            return Err(TransportError::Rejected(format!(
                "unexpected {} message",
                message.message_type
            )));
        }
        // Clients must announce the protocol version.
        let accepted = message.header_str(VERSION_HEADER) == Some(PROTOCOL_VERSION);
        self.ack_tx
            .send(Message::connect_ack(accepted))
            .map_err(|_| TransportError::Closed)
    }

    async fn next_protocol_message(&self) -> Result<Message, TransportError> {
        self.ack_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    fn new_stream(&self) -> Result<EchoStream, TransportError> {
        Ok(EchoStream::new(Arc::clone(&self.server)))
    }

    fn disconnections(&self) -> watch::Receiver<Option<TransportDisconnect>> {
        self.server.disconnect_tx.subscribe()
    }

    fn close(&self) {}
}

pub struct EchoStream {
    server: Arc<EchoServer>,
    operation: Mutex<Option<String>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    ended_tx: watch::Sender<Option<StreamEnd>>,
}

impl EchoStream {
    fn new(server: Arc<EchoServer>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (ended_tx, _) = watch::channel(None);
        Self {
            server,
            operation: Mutex::new(None),
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            ended_tx,
        }
    }

    fn reply(&self, message: Message) {
        if let Some(tx) = self.inbound_tx.lock().unwrap().as_ref() {
            let _ = tx.send(message);
        }
    }

    fn end(&self) {
        self.inbound_tx.lock().unwrap().take();
        self.ended_tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(StreamEnd { error_code: 0 });
            true
        });
    }
}

#[async_trait]
impl TransportStream for EchoStream {
    async fn activate(&self, operation: &str, message: Message) -> Result<(), TransportError> {
        *self.operation.lock().unwrap() = Some(operation.to_string());
        match operation {
            ECHO_MESSAGE => {
                self.reply(
                    Message::application(message.payload)
                        .with_header(SERVICE_MODEL_TYPE_HEADER, "awstest#EchoMessageResponse"),
                );
                self.end();
            }
            ECHO_STREAM_MESSAGES => {
                self.reply(
                    Message::application("{}")
                        .with_header(SERVICE_MODEL_TYPE_HEADER, "awstest#EchoStreamingResponse"),
                );
            }
            CAUSE_SERVICE_ERROR => {
                self.reply(
                    Message::new(MessageType::ApplicationError)
                        .with_header(SERVICE_MODEL_TYPE_HEADER, "awstest#ServiceError")
                        .with_payload(r#"{"message":"Intentionally thrown ServiceError"}"#),
                );
                self.end();
            }
            other => {
                return Err(TransportError::Rejected(format!("unknown operation {other}")));
            }
        }
        Ok(())
    }

    async fn send_message(&self, message: Message) -> Result<(), TransportError> {
        if message.is_terminate_stream() {
            self.server.terminations.fetch_add(1, Ordering::SeqCst);
            self.end();
            return Ok(());
        }
        self.reply(
            Message::application(message.payload)
                .with_header(SERVICE_MODEL_TYPE_HEADER, "awstest#EchoStreamingMessage"),
        );
        Ok(())
    }

    async fn next_message(&self) -> Option<Message> {
        self.inbound_rx.lock().await.recv().await
    }

    fn ended(&self) -> watch::Receiver<Option<StreamEnd>> {
        self.ended_tx.subscribe()
    }

    fn close(&self) {
        self.server.streams_closed.fetch_add(1, Ordering::SeqCst);
        self.end();
    }
}

/// The configuration every test client uses: announces the protocol version
/// from the connect transform.
pub fn client_config() -> ClientConnectionConfig {
    ClientConnectionConfig::new("127.0.0.1", 8033).with_connect_transform(
        |message: Message| async move {
            Ok::<_, eventstream_rpc::BoxError>(message.with_header(VERSION_HEADER, PROTOCOL_VERSION))
        },
    )
}

/// A connected client talking to a fresh echo server.
pub async fn connected_client() -> (ClientConnection<EchoConnection>, Arc<EchoServer>) {
    init_tracing();
    let server = EchoServer::new();
    let builder = EchoBuilder {
        server: Arc::clone(&server),
    };
    let client = ClientConnection::new(client_config(), &builder).unwrap();
    client.connect().await.unwrap();
    (client, server)
}
