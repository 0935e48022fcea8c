//! # POGO Envelope Server
//!
//! Request/response envelope handling for a mobile game backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  POGO ENVELOPE SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - Server settings and auth policies         │
//! │                                                              │
//! │  network/        - Envelope protocol                         │
//! │  ├── protocol.rs - Wire envelope, request types, codec       │
//! │  ├── payloads.rs - Response payload builders                 │
//! │  ├── session.rs  - Player context and session registry       │
//! │  ├── auth.rs     - First-contact handshake                   │
//! │  ├── dispatch.rs - Sub-request routing                       │
//! │  ├── envelope.rs - Call entry point and response assembly    │
//! │  └── server.rs   - WebSocket transport                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Call Lifecycle
//!
//! 1. The transport resolves the session for the connection.
//! 2. The envelope is decoded; a decode failure ends the call with no output.
//! 3. Authenticated sessions with an unverified email get no output.
//! 4. Unauthenticated sessions run the handshake and receive an auth-only
//!    envelope; their sub-requests are dropped.
//! 5. Otherwise every sub-request is dispatched and the response envelope
//!    holds one slot per sub-request, in order.
//!
//! ## Trust Boundary
//!
//! Provider tokens are decoded without signature verification. Token
//! authenticity must be established before envelopes reach this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod network;

// Re-export commonly used types
pub use config::{AuthPolicy, CatalogConfig, ProviderPolicy, ServerConfig, UnverifiedEmailPolicy};
pub use network::envelope::{EnvelopeError, EnvelopeHandler, ResponseSink};
pub use network::protocol::{RequestEnvelope, RequestType, ResponseEnvelope};
pub use network::session::{Player, PlayerUid, Position};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
