//! WebSocket transport for the realtime channel.

use super::{EventTransport, FrameStream};
use crate::error::ChannelError;
use crate::realtime::{ChannelIdentity, Frame};
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

/// Opens one WebSocket per [`EventTransport::open`] call.
///
/// The user id travels as a `userId` query parameter and the token as a bearer
/// `Authorization` header. Text and binary messages carry the JSON envelope
/// `{ "event": <name>, "data": { ... } }`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Create a transport for `url` (`ws://` or `wss://`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn endpoint(&self, identity: &ChannelIdentity) -> Result<reqwest::Url, ChannelError> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| ChannelError::Connect(format!("socket URL {:?}: {e}", self.url)))?;
        url.query_pairs_mut()
            .append_pair("userId", identity.user_id.as_str());
        Ok(url)
    }
}

/// Decode one message. `Ok(None)` for control frames.
fn decode(message: Message) -> Result<Option<Frame>, serde_json::Error> {
    match message {
        Message::Text(text) => serde_json::from_str(&text).map(Some),
        Message::Binary(bytes) => serde_json::from_slice(&bytes).map(Some),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Close(_) => Ok(None),
    }
}

impl EventTransport for WebSocketTransport {
    fn open(&self, identity: &ChannelIdentity) -> BoxFuture<'_, Result<FrameStream, ChannelError>> {
        let endpoint = self.endpoint(identity);
        let bearer = format!("Bearer {}", identity.token);

        Box::pin(async move {
            let mut request = endpoint?
                .as_str()
                .into_client_request()
                .map_err(|e| ChannelError::Connect(e.to_string()))?;
            let bearer = HeaderValue::from_str(&bearer)
                .map_err(|e| ChannelError::Connect(format!("invalid token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);

            let (mut socket, _response) = connect_async(request)
                .await
                .map_err(|e| ChannelError::Connect(e.to_string()))?;

            let frames = async_stream::stream! {
                while let Some(message) = socket.next().await {
                    match message {
                        Ok(Message::Close(close)) => {
                            tracing::debug!(?close, "Socket closed by peer");
                            break;
                        },
                        Ok(message) => match decode(message) {
                            Ok(Some(frame)) => yield Ok(frame),
                            Ok(None) => {},
                            Err(error) => tracing::warn!(%error, "Dropped undecodable frame"),
                        },
                        Err(error) => {
                            yield Err(ChannelError::Closed(error.to_string()));
                            break;
                        },
                    }
                }
            };

            Ok(Box::pin(frames) as FrameStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn identity() -> ChannelIdentity {
        ChannelIdentity {
            user_id: UserId::new("rider 7"),
            token: "t0k".into(),
        }
    }

    #[test]
    fn endpoint_carries_user_id() {
        let transport = WebSocketTransport::new("wss://rt.example.com/ws?v=2");
        let url = transport.endpoint(&identity()).unwrap();
        assert_eq!(url.as_str(), "wss://rt.example.com/ws?v=2&userId=rider+7");
    }

    #[test]
    fn decodes_envelopes_and_skips_control_frames() {
        let frame = decode(Message::Text(
            r#"{"event":"vehicle_updates","data":{"area":"north"}}"#.into(),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(frame.event, "vehicle_updates");
        assert_eq!(frame.data["area"], "north");

        let frame = decode(Message::Binary(br#"{"event":"driver_location"}"#.to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(frame.data, serde_json::Value::Null);

        assert!(decode(Message::Ping(Vec::new())).unwrap().is_none());
        assert!(decode(Message::Text("{oops".into())).is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connect_error() {
        let transport = WebSocketTransport::new("ws://127.0.0.1:1/ws");
        let outcome = transport.open(&identity()).await;
        assert!(matches!(outcome, Err(ChannelError::Connect(_))));
    }

    #[tokio::test]
    async fn malformed_url_is_a_connect_error() {
        let transport = WebSocketTransport::new("not a url");
        assert!(matches!(
            transport.open(&identity()).await,
            Err(ChannelError::Connect(_))
        ));
    }
}
