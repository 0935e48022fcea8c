//! Envelope Handling
//!
//! Entry point for one request/response cycle:
//!
//! ```text
//! bytes ─► decode ─► verification gate ─► unauthenticated? ─► handshake ─► auth envelope
//!                                              │
//!                                              └─► dispatch ─► assemble ─► encode ─► sink
//! ```
//!
//! A decode failure aborts the call before anything is sent. An
//! authenticated session with an unverified email gets no response at all.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{AuthPolicy, ServerConfig, UnverifiedEmailPolicy};
use crate::network::auth::{self, AuthError};
use crate::network::dispatch::{Dispatcher, Payload};
use crate::network::payloads;
use crate::network::protocol::{
    decode_envelope, encode_envelope, DecodeError, RequestEnvelope, ResponseEnvelope, StatusCode,
};
use crate::network::session::Player;

/// Errors that end a call without a response.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The request envelope could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The handshake refused the credentials.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Email not verified and the policy rejects such sessions.
    #[error("email not verified")]
    EmailNotVerified,
}

impl EnvelopeError {
    /// Whether the connection should be dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EnvelopeError::Decode(_))
    }
}

/// Write-once destination for an encoded response.
///
/// `end` consumes the sink, so at most one buffer is ever delivered.
pub trait ResponseSink {
    /// Deliver the response. Fire-and-forget.
    fn end(self, bytes: Vec<u8>);
}

impl ResponseSink for tokio::sync::oneshot::Sender<Vec<u8>> {
    fn end(self, bytes: Vec<u8>) {
        let _ = self.send(bytes);
    }
}

// =============================================================================
// ASSEMBLER
// =============================================================================

/// Build the response envelope for a dispatched batch.
///
/// Empty slots are encoded as empty byte strings, so `returns` stays
/// parallel to the request sequence.
pub fn assemble(
    status: StatusCode,
    id: u64,
    payloads: Vec<Payload>,
    wants_auth_ticket: bool,
    passthrough: Vec<Vec<u8>>,
    ticket_ttl: Duration,
) -> ResponseEnvelope {
    ResponseEnvelope {
        status_code: status.code(),
        request_id: id,
        unknown6: passthrough,
        auth_ticket: wants_auth_ticket.then(|| payloads::auth_ticket(ticket_ttl)),
        returns: payloads.into_iter().map(Option::unwrap_or_default).collect(),
        ..Default::default()
    }
}

/// Build the auth-only envelope answering a handshake.
pub fn assemble_auth(id: u64, api_url: &str, passthrough: Vec<Vec<u8>>, ticket_ttl: Duration) -> ResponseEnvelope {
    ResponseEnvelope {
        status_code: StatusCode::Redirect.code(),
        request_id: id,
        api_url: api_url.to_string(),
        unknown6: passthrough,
        auth_ticket: Some(payloads::auth_ticket(ticket_ttl)),
        ..Default::default()
    }
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Processes request envelopes for a player context.
#[derive(Debug, Clone)]
pub struct EnvelopeHandler {
    dispatcher: Dispatcher,
    policy: AuthPolicy,
    api_url: String,
    ticket_ttl: Duration,
}

impl EnvelopeHandler {
    /// Create a handler from server configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config.catalog.clone()),
            policy: config.auth,
            api_url: config.api_url.clone(),
            ticket_ttl: config.ticket_ttl,
        }
    }

    /// Run one call and return the response envelope, if any.
    ///
    /// `Ok(None)` is the silent path: nothing must be sent.
    pub fn handle(&self, player: &mut Player, body: &[u8]) -> Result<Option<ResponseEnvelope>, EnvelopeError> {
        let request = decode_envelope(body)?;

        for sub in &request.requests {
            debug!("Got request: {}", sub.kind());
        }

        if player.awaiting_verification() {
            return match self.policy.unverified_email {
                UnverifiedEmailPolicy::Stall => {
                    debug!("Email not verified, withholding response to {}", request.request_id);
                    Ok(None)
                }
                UnverifiedEmailPolicy::Reject => Err(EnvelopeError::EmailNotVerified),
            };
        }

        if !player.authenticated {
            return self.authenticate(player, request).map(Some);
        }

        let payloads = self.dispatcher.dispatch(player, &request.requests);
        Ok(Some(assemble(
            StatusCode::Ok,
            request.request_id,
            payloads,
            request.auth_ticket.is_some(),
            request.unknown6,
            self.ticket_ttl,
        )))
    }

    /// Run one call and return the encoded response, if any.
    pub fn handle_bytes(&self, player: &mut Player, body: &[u8]) -> Result<Option<Vec<u8>>, EnvelopeError> {
        Ok(self.handle(player, body)?.as_ref().map(encode_envelope))
    }

    /// Run one call and hand the encoded response to `sink`.
    ///
    /// The sink is consumed either way; on the silent path and on error it is
    /// dropped without being written.
    pub fn serve<S: ResponseSink>(&self, player: &mut Player, body: &[u8], sink: S) -> Result<(), EnvelopeError> {
        if let Some(bytes) = self.handle_bytes(player, body)? {
            sink.end(bytes);
        }
        Ok(())
    }

    /// Handshake path. The envelope's sub-requests are dropped.
    fn authenticate(&self, player: &mut Player, request: RequestEnvelope) -> Result<ResponseEnvelope, EnvelopeError> {
        auth::authenticate(player, request.auth_info.as_ref(), self.policy.provider)?;

        match player.uid {
            Some(uid) => info!("{} connected! ({})", player.username(), uid.to_uuid_string()),
            None => info!("Anonymous player connected"),
        }

        if !request.requests.is_empty() {
            debug!("Dropping {} requests sent before authentication", request.requests.len());
        }

        Ok(assemble_auth(
            request.request_id,
            &self.api_url,
            request.unknown6,
            self.ticket_ttl,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderPolicy;
    use crate::network::auth::{derive_uid, TokenClaims, GOOGLE_PROVIDER};
    use crate::network::protocol::{AuthInfo, AuthTicket, Jwt, Request, RequestType};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use prost::Message;
    use proptest::prelude::*;

    fn google_token(email: &str, verified: bool) -> String {
        let claims = TokenClaims {
            email: Some(email.into()),
            email_verified: verified,
            sub: None,
            exp: 0,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"k")).unwrap()
    }

    fn login_envelope(id: u64, email: &str, verified: bool) -> Vec<u8> {
        RequestEnvelope {
            request_id: id,
            requests: vec![Request::new(RequestType::GetPlayer, Vec::new())],
            unknown6: vec![vec![6, 6, 6]],
            auth_info: Some(AuthInfo {
                provider: GOOGLE_PROVIDER.into(),
                token: Some(Jwt {
                    contents: google_token(email, verified),
                    unknown2: 59,
                }),
            }),
            ..Default::default()
        }
        .encode_to_vec()
    }

    fn verified_player() -> Player {
        let mut player = Player::new();
        player.authenticated = true;
        player.email_verified = true;
        player
    }

    #[test]
    fn test_first_envelope_authenticates() {
        let handler = EnvelopeHandler::new(&ServerConfig::default());
        let mut player = Player::new();

        let response = handler
            .handle(&mut player, &login_envelope(42, "a@gmail.com", true))
            .unwrap()
            .unwrap();

        assert!(player.authenticated);
        assert_eq!(player.email.as_deref(), Some("a@gmail.com"));
        assert_eq!(player.uid, Some(derive_uid("a@gmail.com")));
        assert_eq!(response.request_id, 42);
        assert_eq!(response.status_code, StatusCode::Redirect.code());
        assert!(response.returns.is_empty());
        assert_eq!(response.unknown6, vec![vec![6, 6, 6]]);
        assert!(response.auth_ticket.is_some());
    }

    #[test]
    fn test_dispatch_after_authentication() {
        let handler = EnvelopeHandler::new(&ServerConfig::default());
        let mut player = verified_player();
        let body = RequestEnvelope {
            request_id: 7,
            requests: vec![
                Request::new(RequestType::GetPlayer, Vec::new()),
                Request::new(RequestType::Invalid(9999), Vec::new()),
            ],
            unknown6: vec![vec![1], vec![2, 3]],
            ..Default::default()
        }
        .encode_to_vec();

        let response = handler.handle(&mut player, &body).unwrap().unwrap();

        assert_eq!(response.request_id, 7);
        assert_eq!(response.status_code, StatusCode::Ok.code());
        assert_eq!(response.returns.len(), 2);
        assert!(!response.returns[0].is_empty());
        assert!(response.returns[1].is_empty());
        assert_eq!(response.unknown6, vec![vec![1], vec![2, 3]]);
        assert!(response.auth_ticket.is_none());
    }

    #[test]
    fn test_empty_body_answers_empty_envelope() {
        let handler = EnvelopeHandler::new(&ServerConfig::default());
        let mut player = verified_player();
        let body = RequestEnvelope::default().encode_to_vec();
        assert!(body.is_empty());

        let response = handler.handle(&mut player, &body).unwrap().unwrap();

        assert_eq!(response.request_id, 0);
        assert_eq!(response.status_code, StatusCode::Ok.code());
        assert!(response.returns.is_empty());
        assert!(response.unknown6.is_empty());

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        handler.serve(&mut player, &[], tx).unwrap();
        let bytes = rx.try_recv().unwrap();
        let decoded = ResponseEnvelope::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.status_code, StatusCode::Ok.code());
    }

    #[test]
    fn test_auth_ticket_on_request() {
        let handler = EnvelopeHandler::new(&ServerConfig::default());
        let mut player = verified_player();
        let body = RequestEnvelope {
            request_id: 1,
            auth_ticket: Some(AuthTicket::default()),
            ..Default::default()
        }
        .encode_to_vec();

        let response = handler.handle(&mut player, &body).unwrap().unwrap();
        assert!(response.auth_ticket.is_some());
    }

    #[test]
    fn test_unverified_email_is_silent() {
        let handler = EnvelopeHandler::new(&ServerConfig::default());
        let mut player = Player::new();

        // Handshake itself still answers.
        let login = handler.handle(&mut player, &login_envelope(1, "b@gmail.com", false)).unwrap();
        assert!(login.is_some());
        assert!(player.awaiting_verification());

        let body = RequestEnvelope {
            request_id: 2,
            requests: vec![Request::new(RequestType::GetPlayer, Vec::new())],
            ..Default::default()
        }
        .encode_to_vec();

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        handler.serve(&mut player, &body, tx).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unverified_email_reject_policy() {
        let mut config = ServerConfig::default();
        config.auth.unverified_email = UnverifiedEmailPolicy::Reject;
        let handler = EnvelopeHandler::new(&config);
        let mut player = Player::new();
        player.authenticated = true;

        let body = RequestEnvelope { request_id: 3, ..Default::default() }.encode_to_vec();
        let result = handler.handle(&mut player, &body);

        assert!(matches!(result, Err(EnvelopeError::EmailNotVerified)));
    }

    #[test]
    fn test_strict_provider_policy() {
        let mut config = ServerConfig::default();
        config.auth.provider = ProviderPolicy::Strict;
        let handler = EnvelopeHandler::new(&config);
        let mut player = Player::new();

        let body = RequestEnvelope {
            request_id: 5,
            auth_info: Some(AuthInfo {
                provider: "ptc".into(),
                token: None,
            }),
            ..Default::default()
        }
        .encode_to_vec();

        let result = handler.handle(&mut player, &body);

        assert!(matches!(result, Err(EnvelopeError::Auth(AuthError::UnsupportedProvider(_)))));
        assert!(!player.authenticated);
    }

    #[test]
    fn test_decode_error_sends_nothing() {
        let handler = EnvelopeHandler::new(&ServerConfig::default());
        let mut player = verified_player();

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let result = handler.serve(&mut player, &[0xFF, 0xFF], tx);

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_serve_writes_once() {
        let handler = EnvelopeHandler::new(&ServerConfig::default());
        let mut player = verified_player();
        let body = RequestEnvelope {
            request_id: 11,
            requests: vec![Request::new(RequestType::DownloadSettings, Vec::new())],
            ..Default::default()
        }
        .encode_to_vec();

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        handler.serve(&mut player, &body, tx).unwrap();

        let bytes = rx.try_recv().unwrap();
        let response = ResponseEnvelope::decode(bytes.as_slice()).unwrap();
        assert_eq!(response.request_id, 11);
        assert_eq!(response.returns.len(), 1);
    }

    #[test]
    fn test_assemble_fills_empty_slots() {
        let envelope = assemble(
            StatusCode::Ok,
            9,
            vec![None, Some(vec![1]), None],
            false,
            Vec::new(),
            Duration::from_secs(1),
        );

        assert_eq!(envelope.returns, vec![Vec::new(), vec![1], Vec::new()]);
        assert!(envelope.auth_ticket.is_none());
    }

    proptest! {
        #[test]
        fn prop_response_parallels_requests(
            id in any::<u64>(),
            codes in proptest::collection::vec(any::<i32>(), 0..24),
            passthrough in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..8), 0..3),
        ) {
            let handler = EnvelopeHandler::new(&ServerConfig::default());
            let mut player = verified_player();
            let requests: Vec<Request> = codes
                .iter()
                .map(|code| Request { request_type: *code, request_message: Vec::new() })
                .collect();
            let body = RequestEnvelope {
                request_id: id,
                requests: requests.clone(),
                unknown6: passthrough.clone(),
                ..Default::default()
            }
            .encode_to_vec();

            let response = handler.handle(&mut player, &body).unwrap().unwrap();

            prop_assert_eq!(response.request_id, id);
            prop_assert_eq!(&response.unknown6, &passthrough);
            prop_assert_eq!(response.returns.len(), requests.len());
            for (request, slot) in requests.iter().zip(&response.returns) {
                if let RequestType::Invalid(_) = request.kind() {
                    prop_assert!(slot.is_empty());
                }
            }
        }
    }
}
