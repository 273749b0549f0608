//! Common testing infrastructure for the client core tests.
//!
//! [`MockConnection`] and [`MockStream`] stand in for a real transport. Every
//! mock shares a probe with the test so it can script the server side
//! (acknowledgements, inbound messages, stream ends, disconnects) and inspect
//! what the client did.

use crate::{
    config::{ClientConnectionConfig, TransportOptions},
    core::connection::ClientConnection,
    error::TransportError,
    protocol::Message,
    transport::{
        ConnectionBuilder, StreamEnd, TransportConnection, TransportDisconnect, TransportStream,
    },
};
use async_trait::async_trait;
use std::sync::{
    Arc, Mutex, Once,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::{mpsc, watch};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("eventstream_rpc=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Lets every deferred notification and close task run to completion.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// How the mock server answers the `Connect` message.
#[derive(Debug, Clone)]
pub enum AckBehavior {
    Reply(Message),
    /// Never answers.
    Never,
    /// Disconnects with the given error code instead of answering.
    Disconnect(i32),
    /// The transport fails while waiting for the answer.
    Fail,
}

impl AckBehavior {
    pub fn accept() -> Self {
        AckBehavior::Reply(Message::connect_ack(true))
    }
}

/// How new mock streams behave.
#[derive(Debug, Clone, Default)]
pub struct StreamBehavior {
    pub fail_activate: bool,
    /// The activation is never answered.
    pub hang_activate: bool,
    pub fail_send: bool,
    /// Pushed as inbound messages once the stream is activated.
    pub responses: Vec<Message>,
    /// Ends the stream with this error code right after the responses.
    pub end_after_responses: Option<i32>,
}

#[derive(Debug)]
pub struct ConnectionProbe {
    pub connect_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_new_stream: AtomicBool,
    pub sent: Mutex<Vec<Message>>,
    pub streams: Mutex<Vec<Arc<StreamProbe>>>,
    pub stream_behavior: Mutex<StreamBehavior>,
    ack: Mutex<AckBehavior>,
    disconnect_tx: watch::Sender<Option<TransportDisconnect>>,
}

impl ConnectionProbe {
    pub fn new(ack: AckBehavior) -> Arc<Self> {
        let (disconnect_tx, _) = watch::channel(None);
        Arc::new(Self {
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_new_stream: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            stream_behavior: Mutex::new(StreamBehavior::default()),
            ack: Mutex::new(ack),
            disconnect_tx,
        })
    }

    /// Simulates the transport going away.
    pub fn disconnect(&self, error_code: i32) {
        self.disconnect_tx
            .send_replace(Some(TransportDisconnect { error_code }));
    }

    pub fn set_stream_behavior(&self, behavior: StreamBehavior) {
        *self.stream_behavior.lock().unwrap() = behavior;
    }

    pub fn stream(&self, index: usize) -> Arc<StreamProbe> {
        Arc::clone(&self.streams.lock().unwrap()[index])
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub struct StreamProbe {
    pub activations: Mutex<Vec<(String, Message)>>,
    pub sent: Mutex<Vec<Message>>,
    pub close_calls: AtomicUsize,
    behavior: StreamBehavior,
    ended_tx: watch::Sender<Option<StreamEnd>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl StreamProbe {
    fn new(behavior: StreamBehavior) -> Arc<Self> {
        let (ended_tx, _) = watch::channel(None);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            activations: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            behavior,
            ended_tx,
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        })
    }

    /// Queues an inbound message from the server.
    pub fn push(&self, message: Message) {
        if let Some(tx) = self.inbound_tx.lock().unwrap().as_ref() {
            let _ = tx.send(message);
        }
    }

    /// Ends the stream from the server side. Already queued messages stay
    /// readable.
    pub fn end(&self, error_code: i32) {
        self.inbound_tx.lock().unwrap().take();
        self.ended_tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(StreamEnd { error_code });
            true
        });
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn activation_count(&self) -> usize {
        self.activations.lock().unwrap().len()
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn terminations_sent(&self) -> usize {
        self.sent_messages()
            .iter()
            .filter(|m| m.is_terminate_stream())
            .count()
    }
}

#[derive(Debug)]
pub struct MockStream {
    probe: Arc<StreamProbe>,
}

#[async_trait]
impl TransportStream for MockStream {
    async fn activate(&self, operation: &str, message: Message) -> Result<(), TransportError> {
        self.probe
            .activations
            .lock()
            .unwrap()
            .push((operation.to_string(), message));
        if self.probe.behavior.fail_activate {
            return Err(TransportError::Rejected("activation refused".into()));
        }
        if self.probe.behavior.hang_activate {
            return std::future::pending().await;
        }
        for response in &self.probe.behavior.responses {
            self.probe.push(response.clone());
        }
        if let Some(error_code) = self.probe.behavior.end_after_responses {
            self.probe.end(error_code);
        }
        Ok(())
    }

    async fn send_message(&self, message: Message) -> Result<(), TransportError> {
        if self.probe.behavior.fail_send {
            return Err(TransportError::Closed);
        }
        self.probe.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn next_message(&self) -> Option<Message> {
        self.probe.inbound_rx.lock().await.recv().await
    }

    fn ended(&self) -> watch::Receiver<Option<StreamEnd>> {
        self.probe.ended_tx.subscribe()
    }

    fn close(&self) {
        self.probe.close_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.inbound_tx.lock().unwrap().take();
    }
}

#[derive(Debug)]
pub struct MockConnection {
    probe: Arc<ConnectionProbe>,
}

impl MockConnection {
    pub fn new(probe: Arc<ConnectionProbe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl TransportConnection for MockConnection {
    type Stream = MockStream;

    async fn connect(&self) -> Result<(), TransportError> {
        self.probe.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }

    async fn send_protocol_message(&self, message: Message) -> Result<(), TransportError> {
        self.probe.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn next_protocol_message(&self) -> Result<Message, TransportError> {
        let ack = self.probe.ack.lock().unwrap().clone();
        match ack {
            AckBehavior::Reply(message) => Ok(message),
            AckBehavior::Never => std::future::pending().await,
            AckBehavior::Disconnect(error_code) => {
                self.probe.disconnect(error_code);
                std::future::pending().await
            }
            AckBehavior::Fail => Err(TransportError::Closed),
        }
    }

    fn new_stream(&self) -> Result<MockStream, TransportError> {
        if self.probe.fail_new_stream.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("no streams available".into()));
        }
        let behavior = self.probe.stream_behavior.lock().unwrap().clone();
        let stream = StreamProbe::new(behavior);
        self.probe.streams.lock().unwrap().push(Arc::clone(&stream));
        Ok(MockStream { probe: stream })
    }

    fn disconnections(&self) -> watch::Receiver<Option<TransportDisconnect>> {
        self.probe.disconnect_tx.subscribe()
    }

    fn close(&self) {
        self.probe.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockBuilder {
    pub probe: Arc<ConnectionProbe>,
    pub fail: bool,
}

impl ConnectionBuilder for MockBuilder {
    type Connection = MockConnection;

    fn build(&self, _options: &TransportOptions) -> Result<MockConnection, TransportError> {
        if self.fail {
            return Err(TransportError::Rejected("unsupported socket options".into()));
        }
        Ok(MockConnection::new(Arc::clone(&self.probe)))
    }
}

pub fn test_config() -> ClientConnectionConfig {
    ClientConnectionConfig::new("127.0.0.1", 8033)
}

pub fn mock_client_with_config(
    config: ClientConnectionConfig,
    ack: AckBehavior,
) -> (ClientConnection<MockConnection>, Arc<ConnectionProbe>) {
    init_tracing();
    let probe = ConnectionProbe::new(ack);
    let client = ClientConnection::with_transport(config, MockConnection::new(Arc::clone(&probe)));
    (client, probe)
}

pub fn mock_client(ack: AckBehavior) -> (ClientConnection<MockConnection>, Arc<ConnectionProbe>) {
    mock_client_with_config(test_config(), ack)
}

/// A client that has completed its handshake.
pub async fn connected_client() -> (ClientConnection<MockConnection>, Arc<ConnectionProbe>) {
    let (client, probe) = mock_client(AckBehavior::accept());
    client.connect().await.unwrap();
    (client, probe)
}
