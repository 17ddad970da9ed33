//! The websocket transport: opening the socket, and serializing reads and
//! writes for the connection loop and the heartbeat task that share it.

use crate::error::{GatewayError, GatewayErrorKind};
use futures_util::{SinkExt, StreamExt};
use std::{borrow::Cow, sync::Arc};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A single inbound or outbound websocket frame, reduced to the shapes the
/// connection loop cares about.
#[derive(Debug)]
pub enum Frame {
    /// A complete UTF-8 text frame.
    Text(String),
    /// A complete binary frame.
    Binary(Vec<u8>),
    /// The peer closed the connection.
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// A live websocket connection to the gateway.
///
/// Cloning a `Transport` is cheap and shares the same underlying socket: the
/// connection loop's reader and the heartbeat task both hold a clone so that
/// writes from either are serialized through the same mutex, guaranteeing no
/// two frames' bytes ever interleave.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

enum Inner {
    Live {
        write: Mutex<futures_util::stream::SplitSink<WsStream, Message>>,
        read: Mutex<futures_util::stream::SplitStream<WsStream>>,
    },
    /// An in-process stand-in for a real socket, used by connection-loop
    /// tests that want to drive the real state machine (`connection::run`)
    /// without opening a TCP connection. Frames sent by the client land on
    /// `to_fake_peer`; frames the test wants the client to receive are fed
    /// in on `from_fake_peer`.
    #[cfg(test)]
    Fake {
        to_fake_peer: tokio::sync::mpsc::UnboundedSender<Frame>,
        from_fake_peer: Mutex<tokio::sync::mpsc::UnboundedReceiver<Frame>>,
    },
}

impl Transport {
    /// Open a websocket connection to `url`.
    ///
    /// `max_frame_size`/`max_message_size` limits are left disabled: Discord
    /// is a trusted peer, not an adversarial one, so the defaults exist only
    /// to protect against a misbehaving server.
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let parsed = url::Url::parse(url).map_err(|source| {
            GatewayError::from_kind(GatewayErrorKind::ClientError { close_code: None })
                .with_source(source)
        })?;

        let config = WebSocketConfig {
            max_frame_size: None,
            max_message_size: None,
            ..WebSocketConfig::default()
        };

        let (stream, _response) = tokio_tungstenite::connect_async_with_config(parsed, Some(config), false)
            .await
            .map_err(|source| {
                GatewayError::from_kind(GatewayErrorKind::ConnectionClosed { close_code: None })
                    .with_source(source)
            })?;

        let (write, read) = stream.split();

        Ok(Self {
            inner: Arc::new(Inner::Live {
                write: Mutex::new(write),
                read: Mutex::new(read),
            }),
        })
    }

    /// Build a paired `(Transport, FakePeer)` for driving `connection::run`
    /// against an in-process fake instead of a real socket.
    ///
    /// The returned [`FakePeer`] plays the part of the gateway server: send
    /// frames on it for the client under test to receive, and read from it
    /// to observe what the client sent.
    #[cfg(test)]
    pub(crate) fn fake() -> (Self, FakePeer) {
        let (to_fake_peer, from_client) = tokio::sync::mpsc::unbounded_channel();
        let (to_client, from_fake_peer) = tokio::sync::mpsc::unbounded_channel();

        let transport = Self {
            inner: Arc::new(Inner::Fake {
                to_fake_peer,
                from_fake_peer: Mutex::new(from_fake_peer),
            }),
        };

        let peer = FakePeer {
            to_client,
            from_client: Mutex::new(from_client),
        };

        (transport, peer)
    }

    /// Send a complete text frame.
    pub async fn send_text(&self, text: String) -> Result<(), GatewayError> {
        match &*self.inner {
            Inner::Live { write, .. } => {
                let mut write = write.lock().await;

                write.send(Message::Text(text)).await.map_err(|source| {
                    GatewayError::from_kind(GatewayErrorKind::ConnectionClosed { close_code: None })
                        .with_source(source)
                })
            }
            #[cfg(test)]
            Inner::Fake { to_fake_peer, .. } => to_fake_peer.send(Frame::Text(text)).map_err(|_| {
                GatewayError::from_kind(GatewayErrorKind::ConnectionClosed { close_code: None })
            }),
        }
    }

    /// Receive the next frame, translating websocket control frames
    /// (ping/pong) transparently and surfacing everything else.
    pub async fn receive_frame(&self) -> Result<Frame, GatewayError> {
        match &*self.inner {
            Inner::Live { read, .. } => {
                let mut read = read.lock().await;

                loop {
                    let message = read.next().await.ok_or_else(|| {
                        GatewayError::from_kind(GatewayErrorKind::ConnectionClosed { close_code: None })
                    })?;

                    let message = message.map_err(|source| {
                        GatewayError::from_kind(GatewayErrorKind::ConnectionClosed { close_code: None })
                            .with_source(source)
                    })?;

                    return Ok(match message {
                        Message::Text(text) => Frame::Text(text),
                        Message::Binary(bytes) => Frame::Binary(bytes),
                        Message::Close(frame) => Frame::Close {
                            code: frame.as_ref().map(|f| f.code.into()),
                            reason: frame.map(|f| f.reason.to_string()),
                        },
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                    });
                }
            }
            #[cfg(test)]
            Inner::Fake { from_fake_peer, .. } => {
                let mut from_fake_peer = from_fake_peer.lock().await;

                from_fake_peer.recv().await.ok_or_else(|| {
                    GatewayError::from_kind(GatewayErrorKind::ConnectionClosed { close_code: None })
                })
            }
        }
    }

    /// Close the connection with the given code and reason.
    ///
    /// Failing to send the close frame (e.g. the socket is already gone) is
    /// not itself an error worth propagating: the caller is tearing the
    /// connection down either way.
    pub async fn close(&self, code: u16, reason: &str) {
        match &*self.inner {
            Inner::Live { write, .. } => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: Cow::Owned(reason.to_owned()),
                };

                let mut write = write.lock().await;
                let _ = write.send(Message::Close(Some(frame))).await;
            }
            #[cfg(test)]
            Inner::Fake { to_fake_peer, .. } => {
                let _ = to_fake_peer.send(Frame::Close {
                    code: Some(code),
                    reason: Some(reason.to_owned()),
                });
            }
        }
    }
}

/// The server side of a [`Transport::fake`] pair: plays the part of the
/// gateway in connection-loop tests.
#[cfg(test)]
pub(crate) struct FakePeer {
    to_client: tokio::sync::mpsc::UnboundedSender<Frame>,
    from_client: Mutex<tokio::sync::mpsc::UnboundedReceiver<Frame>>,
}

#[cfg(test)]
impl FakePeer {
    /// Send a text frame to the client under test.
    pub(crate) fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Frame::Text(text.into()));
    }

    /// Receive the next frame the client under test sent, waiting for it if
    /// necessary.
    pub(crate) async fn recv(&self) -> Option<Frame> {
        self.from_client.lock().await.recv().await
    }
}

/// Build the gateway connection URL's query string.
///
/// Always requests `v=10&encoding=json`; appends `compress=zlib-stream` when
/// the caller has enabled transport compression.
pub fn build_url(base: &str, zlib_stream: bool) -> String {
    let mut url = base.to_owned();

    url.push_str(if base.contains('?') { "&v=10" } else { "?v=10" });
    url.push_str("&encoding=json");

    if zlib_stream {
        url.push_str("&compress=zlib-stream");
    }

    url
}

#[cfg(test)]
mod tests {
    use super::build_url;

    #[test]
    fn builds_plain_query() {
        assert_eq!(
            build_url("wss://gateway.discord.gg", false),
            "wss://gateway.discord.gg?v=10&encoding=json"
        );
    }

    #[test]
    fn builds_zlib_stream_query() {
        assert_eq!(
            build_url("wss://gateway.discord.gg", true),
            "wss://gateway.discord.gg?v=10&encoding=json&compress=zlib-stream"
        );
    }
}
