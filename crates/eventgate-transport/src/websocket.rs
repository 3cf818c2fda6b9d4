//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::{
    CloseReason, Connection, ConnectionId, Frame, Handshake, PendingConnection, Transport,
    TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;
    type Pending = PendingWebSocket;

    async fn accept(&mut self) -> Result<Self::Pending, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::trace!(%addr, "accepted TCP connection");
        Ok(PendingWebSocket { stream, addr })
    }
}

/// A TCP connection that has not yet completed the WebSocket upgrade.
pub struct PendingWebSocket {
    stream: TcpStream,
    addr: SocketAddr,
}

impl PendingWebSocket {
    /// The remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl PendingConnection for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn upgrade(self) -> Result<(Self::Connection, Handshake), Self::Error> {
        let Self { stream, addr } = self;

        let mut handshake = Handshake::default();
        let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            handshake.path = req.uri().path().to_owned();
            handshake.query = req.uri().query().map(str::to_owned);
            Ok(resp)
        };

        let ws = tokio_tungstenite::accept_hdr_async(stream, capture)
            .await
            .map_err(|e| {
                TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, path = %handshake.path, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok((
            WebSocketConnection {
                id,
                sink: Mutex::new(sink),
                stream: Mutex::new(stream),
            },
            handshake,
        ))
    }
}

/// A single WebSocket connection.
///
/// The write and read halves are locked separately so a task blocked in
/// [`recv`](Connection::recv) never holds up senders.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, frame: Frame) -> Result<(), Self::Error> {
        let msg = match frame {
            Frame::Text(data) => {
                let text = String::from_utf8(data.to_vec()).map_err(TransportError::InvalidFrame)?;
                Message::Text(text.into())
            }
            Frame::Binary(data) => Message::Binary(data),
        };
        self.send_message(msg).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(Some(frame))))
                    if matches!(frame.code, CloseCode::Normal | CloseCode::Away) =>
                {
                    return Ok(None);
                }
                Some(Ok(Message::Close(frame))) => {
                    let detail = frame
                        .map(|f| format!("close code {}", u16::from(f.code)))
                        .unwrap_or_else(|| "close without status".to_owned());
                    return Err(TransportError::ConnectionClosed(detail));
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
                None => {
                    return Err(TransportError::ConnectionClosed("stream ended".to_owned()));
                }
            }
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.send_message(Message::Ping(Bytes::new())).await
    }

    async fn close(&self, reason: CloseReason) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: CloseCode::from(reason.code()),
            reason: reason.message().to_owned().into(),
        };
        self.send_message(Message::Close(Some(frame))).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
