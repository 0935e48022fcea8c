//! Network Layer
//!
//! Envelope protocol and the WebSocket transport that hosts it.

pub mod auth;
pub mod dispatch;
pub mod envelope;
pub mod payloads;
pub mod protocol;
pub mod session;
pub mod server;

pub use auth::{AuthError, TokenClaims, authenticate, derive_uid};
pub use dispatch::{Dispatcher, Payload};
pub use envelope::{EnvelopeError, EnvelopeHandler, ResponseSink, assemble};
pub use protocol::{
    DecodeError, Request, RequestEnvelope, RequestType, ResponseEnvelope, StatusCode,
    decode_envelope, encode_envelope,
};
pub use session::{Player, PlayerUid, Position, Session, SessionManager};
pub use server::{EnvelopeServer, ServerError};
