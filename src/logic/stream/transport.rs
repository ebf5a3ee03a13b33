//! Stream Transport
//!
//! The connection manager only needs "open a URL, get a stream of text
//! frames". Production uses WebSocket; tests plug in an in-memory channel.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{DecodeError, StreamError, StreamResult};

/// Inbound text frames of one live connection
///
/// Ends (`None`) when the peer closes. A `Decode` error drops one frame,
/// any other error ends the connection. Dropping the stream closes it.
pub type FrameStream = BoxStream<'static, StreamResult<String>>;

/// Opens transport connections
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, StreamResult<FrameStream>>;
}

// ============================================================================
// WEBSOCKET
// ============================================================================

/// WebSocket transport on tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, StreamResult<FrameStream>> {
        let url = url.to_string();

        async move {
            let (socket, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
            tracing::debug!(status = %response.status(), "WebSocket handshake complete: {}", url);

            // Ping/pong is answered by tungstenite while the stream is polled
            let frames = socket.filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                    Ok(Message::Binary(bytes)) => Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|_| StreamError::Decode(DecodeError::NonUtf8Binary)),
                    ),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!("Close frame received: {:?}", frame);
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(StreamError::from(e))),
                }
            });

            Ok(frames.boxed())
        }
        .boxed()
    }
}
