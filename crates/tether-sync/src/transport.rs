use tether_core::ConnectionPhase;
use tether_core::ServerConfig;
use thiserror::Error;
use url::Url;

pub const WS_PATH: &str = "/ws";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to chat server")]
    NotConnected,
    #[error("failed to serialize outbound frame: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid websocket url: {0}")]
    Url(#[from] url::ParseError),
    #[error("session cookie is not a valid header value")]
    InvalidCookie,
    #[error("cannot derive a websocket url from origin {0}")]
    UnsupportedOrigin(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

/// Explicit `ws_url` wins; otherwise the page origin's scheme maps
/// `http -> ws` and `https -> wss` and the path becomes `/ws`.
pub fn resolve_ws_url(server: &ServerConfig) -> Result<Url, TransportError> {
    if let Some(explicit) = server.ws_url.as_deref() {
        return Ok(Url::parse(explicit)?);
    }
    let mut url = Url::parse(&server.page_origin)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(TransportError::UnsupportedOrigin(server.page_origin.clone())),
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::UnsupportedOrigin(server.page_origin.clone()))?;
    url.set_path(WS_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Reconnect policy for the one chat socket of a session. Pure: callers feed
/// it socket outcomes plus the current time and dial whatever URL it hands
/// back.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    url: Url,
    phase: ConnectionPhase,
    retry_delay_ms: u64,
    retry_at_ms: Option<u64>,
    attempts: u64,
}

impl ConnectionMachine {
    pub fn new(url: Url, retry_delay_ms: u64) -> Self {
        Self {
            url,
            phase: ConnectionPhase::Disconnected,
            retry_delay_ms,
            retry_at_ms: None,
            attempts: 0,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn retry_delay_ms(&self) -> u64 {
        self.retry_delay_ms
    }

    pub fn retry_deadline(&self) -> Option<u64> {
        self.retry_at_ms
    }

    /// Starts an attempt unless one is open or in flight.
    pub fn connect(&mut self) -> Option<Url> {
        match self.phase {
            ConnectionPhase::Open | ConnectionPhase::Connecting => None,
            ConnectionPhase::Disconnected | ConnectionPhase::Closed | ConnectionPhase::Errored => {
                self.phase = ConnectionPhase::Connecting;
                self.retry_at_ms = None;
                self.attempts += 1;
                Some(self.url.clone())
            }
        }
    }

    pub fn on_open(&mut self) {
        self.phase = ConnectionPhase::Open;
        self.retry_at_ms = None;
    }

    pub fn on_close(&mut self, now_ms: u64) {
        self.fail(ConnectionPhase::Closed, now_ms);
    }

    pub fn on_error(&mut self, now_ms: u64) {
        self.fail(ConnectionPhase::Errored, now_ms);
    }

    pub fn on_connect_failed(&mut self, now_ms: u64) {
        self.fail(ConnectionPhase::Errored, now_ms);
    }

    /// An error followed by a close schedules one retry, not two.
    fn fail(&mut self, phase: ConnectionPhase, now_ms: u64) {
        self.phase = phase;
        if self.retry_at_ms.is_none() {
            self.retry_at_ms = Some(now_ms.saturating_add(self.retry_delay_ms));
        }
    }

    /// Fires the pending retry once its deadline has passed.
    pub fn poll(&mut self, now_ms: u64) -> Option<Url> {
        match self.retry_at_ms {
            Some(deadline) if deadline <= now_ms => {
                self.retry_at_ms = None;
                self.connect()
            }
            _ => None,
        }
    }

    pub fn ensure_sendable(&self) -> Result<(), TransportError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}
