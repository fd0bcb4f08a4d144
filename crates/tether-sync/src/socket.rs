use std::sync::Arc;
use std::time::Duration;

use futures_util::Sink;
use futures_util::SinkExt;
use futures_util::Stream;
use futures_util::StreamExt;
use serde_json::Value;
use tether_core::Clock;
use tether_core::ConnectionPhase;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::transport::ConnectionMachine;
use crate::transport::TransportError;

/// Monotonic clock on tokio's timer, so paused-time tests drive it too.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Phase(ConnectionPhase),
    Frame(String),
}

/// Sending half handed to the session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Transport {
    phase: watch::Receiver<ConnectionPhase>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Transport {
    /// A transport plus the ends its socket task drives.
    pub(crate) fn channel(
        phase: ConnectionPhase,
    ) -> (
        Self,
        watch::Sender<ConnectionPhase>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (phase_tx, phase_rx) = watch::channel(phase);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = Self {
            phase: phase_rx,
            outbound: outbound_tx,
        };
        (transport, phase_tx, outbound_rx)
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// Serializes `payload` and queues it on the open socket. Fails right
    /// away when the socket is not open; nothing is held for a later
    /// connection.
    pub fn send(&self, payload: &Value) -> Result<(), TransportError> {
        if self.phase() != ConnectionPhase::Open {
            return Err(TransportError::NotConnected);
        }
        let text = serde_json::to_string(payload)?;
        self.outbound
            .send(text)
            .map_err(|_| TransportError::NotConnected)
    }
}

pub struct TransportTask {
    pub transport: Transport,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub handle: JoinHandle<()>,
}

pub fn spawn_transport(
    machine: ConnectionMachine,
    clock: Arc<dyn Clock>,
    session_cookie: Option<String>,
) -> TransportTask {
    let (transport, phase_tx, outbound_rx) = Transport::channel(machine.phase());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_transport(
        machine,
        clock,
        session_cookie,
        phase_tx,
        outbound_rx,
        events_tx,
    ));
    TransportTask {
        transport,
        events: events_rx,
        handle,
    }
}

enum PumpOutcome {
    Closed,
    Errored,
    Shutdown,
}

/// Drives one socket for the life of a session: dials, pumps frames both
/// ways while open, and redials on the machine's schedule. Returns once the
/// session stops listening for events or drops every `Transport`.
pub async fn run_transport(
    mut machine: ConnectionMachine,
    clock: Arc<dyn Clock>,
    session_cookie: Option<String>,
    phase_tx: watch::Sender<ConnectionPhase>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut next = machine.connect();
    loop {
        let url = match next.take() {
            Some(url) => url,
            None => match wait_for_retry(&mut machine, clock.as_ref(), &events_tx).await {
                Some(url) => url,
                None => return,
            },
        };
        if !publish(&phase_tx, &events_tx, machine.phase()) {
            return;
        }

        tracing::info!(url = %url, attempt = machine.attempts(), "connecting to chat server");
        let stream = match dial(&url, session_cookie.as_deref()).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "chat server connection failed");
                machine.on_connect_failed(clock.now_ms());
                if !publish(&phase_tx, &events_tx, machine.phase()) {
                    return;
                }
                continue;
            }
        };

        discard_unsent(&mut outbound_rx);
        machine.on_open();
        if !publish(&phase_tx, &events_tx, machine.phase()) {
            return;
        }
        tracing::info!("chat server connection open");

        let outcome = pump(stream, &mut outbound_rx, &events_tx).await;
        let now = clock.now_ms();
        match outcome {
            PumpOutcome::Closed => machine.on_close(now),
            PumpOutcome::Errored => machine.on_error(now),
            PumpOutcome::Shutdown => {
                tracing::debug!("transport shutting down");
                return;
            }
        }
        stop_sending(&phase_tx, &mut outbound_rx, machine.phase());
        tracing::warn!(
            phase = machine.phase().label(),
            retry_in_ms = machine.retry_delay_ms(),
            "chat server connection lost"
        );
        if events_tx.send(TransportEvent::Phase(machine.phase())).is_err() {
            return;
        }
    }
}

async fn dial(
    url: &Url,
    session_cookie: Option<&str>,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, TransportError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|err| TransportError::WebSocket(Box::new(err)))?;
    if let Some(cookie) = session_cookie {
        let value = HeaderValue::from_str(cookie).map_err(|_| TransportError::InvalidCookie)?;
        request.headers_mut().insert(COOKIE, value);
    }
    let (stream, _response) = connect_async(request)
        .await
        .map_err(|err| TransportError::WebSocket(Box::new(err)))?;
    Ok(stream)
}

fn publish(
    phase_tx: &watch::Sender<ConnectionPhase>,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
    phase: ConnectionPhase,
) -> bool {
    phase_tx.send_replace(phase);
    events_tx.send(TransportEvent::Phase(phase)).is_ok()
}

async fn wait_for_retry(
    machine: &mut ConnectionMachine,
    clock: &dyn Clock,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Option<Url> {
    loop {
        let now = clock.now_ms();
        if let Some(url) = machine.poll(now) {
            return Some(url);
        }
        let wait_ms = match machine.retry_deadline() {
            Some(deadline) => deadline.saturating_sub(now).max(1),
            None => match machine.connect() {
                Some(url) => return Some(url),
                None => machine.retry_delay_ms(),
            },
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
            _ = events_tx.closed() => return None,
        }
    }
}

async fn pump<S>(
    stream: S,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> PumpOutcome
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if events_tx.send(TransportEvent::Frame(text.as_str().to_owned())).is_err() {
                        return PumpOutcome::Shutdown;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = write.send(Message::Pong(payload)).await {
                        tracing::warn!(error = %err, "failed to answer ping");
                        return PumpOutcome::Errored;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "server closed the connection");
                    return PumpOutcome::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "websocket read failed");
                    return PumpOutcome::Errored;
                }
                None => return PumpOutcome::Closed,
            },
            outgoing = outbound_rx.recv() => match outgoing {
                Some(text) => {
                    if let Err(err) = write.send(Message::text(text)).await {
                        tracing::warn!(error = %err, "websocket write failed");
                        return PumpOutcome::Errored;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return PumpOutcome::Shutdown;
                }
            },
        }
    }
}

/// Leaves `Open` before draining, so a send racing the close fails instead
/// of landing in the queue of the next connection.
fn stop_sending(
    phase_tx: &watch::Sender<ConnectionPhase>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    phase: ConnectionPhase,
) {
    phase_tx.send_replace(phase);
    discard_unsent(outbound_rx);
}

fn discard_unsent(outbound_rx: &mut mpsc::UnboundedReceiver<String>) {
    let mut dropped = 0usize;
    while outbound_rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::warn!(dropped, "discarded frames queued on a closed connection");
    }
}
