//! WebSocket upgrade negotiation.
//!
//! Only the opening handshake lives here. Once a handler accepts, the session
//! writes `101 Switching Protocols`, stops speaking HTTP and passes the socket
//! to the handler's continuation as a [`WebSocket`]; frames are the
//! continuation's business.
//!
//! ```text
//! Client ── GET + Upgrade headers ──→ Connection ── validate ──→ Accept / Reject
//!                                          │
//!                                   101 + Sec-WebSocket-Accept
//!                                          │
//!                                          ▼
//!                               on_accepted(WebSocket)
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;

use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// The only protocol version negotiated.
pub const WEBSOCKET_VERSION: &str = "13";

/// Any byte stream a session can run on.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// The socket after it has left the HTTP session.
pub type Upgraded = Box<dyn Io>;

pub type WebSocket = WebSocketStream<Upgraded>;

/// Continuation invoked with the socket once the handshake has been written.
pub type OnAccepted = Box<dyn FnOnce(WebSocket) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Handshake values pulled out of a valid upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub version: String,
    pub key: String,
    pub extensions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error("websocket upgrade requires GET, got {0}")]
    NotGet(Method),
    #[error("missing `Upgrade: websocket` header")]
    MissingUpgrade,
    #[error("`Connection` header does not contain `upgrade`")]
    MissingConnectionUpgrade,
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
    #[error("missing Sec-WebSocket-Version header")]
    MissingVersion,
    #[error("unsupported Sec-WebSocket-Version `{0}`")]
    UnsupportedVersion(String),
}

impl UpgradeError {
    pub fn status(&self) -> StatusCode {
        match self {
            UpgradeError::UnsupportedVersion(_) => StatusCode::UpgradeRequired,
            _ => StatusCode::BadRequest,
        }
    }
}

fn has_token(value: Option<&str>, token: &str) -> bool {
    value
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

/// Checks the upgrade, connection, key and version headers.
pub fn validate_handshake(req: &Request) -> Result<Handshake, UpgradeError> {
    if req.method != Method::GET {
        return Err(UpgradeError::NotGet(req.method));
    }
    if !has_token(req.header("Upgrade"), "websocket") {
        return Err(UpgradeError::MissingUpgrade);
    }
    if !has_token(req.header("Connection"), "upgrade") {
        return Err(UpgradeError::MissingConnectionUpgrade);
    }

    let key = req
        .header("Sec-WebSocket-Key")
        .filter(|k| !k.is_empty())
        .ok_or(UpgradeError::MissingKey)?;

    let version = req
        .header("Sec-WebSocket-Version")
        .ok_or(UpgradeError::MissingVersion)?;
    if version != WEBSOCKET_VERSION {
        return Err(UpgradeError::UnsupportedVersion(version.to_string()));
    }

    Ok(Handshake {
        version: version.to_string(),
        key: key.to_string(),
        extensions: req.header("Sec-WebSocket-Extensions").map(str::to_string),
    })
}

/// What an upgrade handler decided.
pub enum UpgradeResponse {
    Accept(AcceptUpgrade),
    Reject(StatusCode),
}

impl fmt::Debug for UpgradeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeResponse::Accept(accept) => f.debug_tuple("Accept").field(accept).finish(),
            UpgradeResponse::Reject(status) => f.debug_tuple("Reject").field(status).finish(),
        }
    }
}

impl UpgradeResponse {
    /// The status this decision puts on the wire.
    pub fn status(&self) -> StatusCode {
        match self {
            UpgradeResponse::Accept(_) => StatusCode::SwitchingProtocols,
            UpgradeResponse::Reject(status) => *status,
        }
    }
}

pub struct AcceptUpgrade {
    pub handshake: Handshake,
    accept_key: String,
    on_accepted: OnAccepted,
}

impl fmt::Debug for AcceptUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptUpgrade")
            .field("handshake", &self.handshake)
            .field("accept_key", &self.accept_key)
            .finish_non_exhaustive()
    }
}

impl AcceptUpgrade {
    /// Base64 SHA-1 of the client key and the RFC 6455 GUID.
    pub fn accept_key(&self) -> &str {
        &self.accept_key
    }

    pub fn response(&self) -> Response {
        ResponseBuilder::new(StatusCode::SwitchingProtocols)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", self.accept_key.clone())
            .build()
    }

    pub fn into_continuation(self) -> OnAccepted {
        self.on_accepted
    }
}

/// Accepts the upgrade if the handshake headers are valid, otherwise rejects
/// with the status matching the first problem found.
pub fn accept<F, Fut>(req: &Request, on_accepted: F) -> UpgradeResponse
where
    F: FnOnce(WebSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    match validate_handshake(req) {
        Ok(handshake) => UpgradeResponse::Accept(AcceptUpgrade {
            accept_key: derive_accept_key(handshake.key.as_bytes()),
            handshake,
            on_accepted: Box::new(
                move |ws: WebSocket| -> Pin<Box<dyn Future<Output = ()> + Send>> {
                    Box::pin(on_accepted(ws))
                },
            ),
        }),
        Err(e) => {
            tracing::debug!(error = %e, path = %req.path, "Rejecting websocket upgrade");
            UpgradeResponse::Reject(e.status())
        }
    }
}

pub fn reject(status: StatusCode) -> UpgradeResponse {
    UpgradeResponse::Reject(status)
}

/// Response written for a rejected upgrade.
pub fn rejection_response(status: StatusCode) -> Response {
    let builder = ResponseBuilder::new(status)
        .content_type("text/plain; charset=utf-8")
        .body(status.reason_phrase().as_bytes().to_vec());

    if status == StatusCode::UpgradeRequired {
        builder.header("Sec-WebSocket-Version", WEBSOCKET_VERSION).build()
    } else {
        builder.build()
    }
}

/// Wraps the raw socket and any bytes read past the handshake, then runs the
/// continuation to completion.
pub async fn hand_off(stream: Upgraded, buffered: Vec<u8>, on_accepted: OnAccepted) {
    let ws = WebSocketStream::from_partially_read(stream, buffered, Role::Server, None).await;
    on_accepted(ws).await;
}
