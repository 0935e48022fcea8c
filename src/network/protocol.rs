//! Protocol Messages
//!
//! Wire format for the request/response envelopes. Messages are protobuf
//! (proto3) declared with `prost` derives, so no build step is needed.
//!
//! Only the outer envelope is interpreted here. Sub-request payloads and
//! response slots are carried as opaque bytes.

use std::fmt;

use prost::Message;
use thiserror::Error;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Outer envelope sent by the client.
#[derive(Clone, PartialEq, Message)]
pub struct RequestEnvelope {
    /// Client-side status code (ignored).
    #[prost(int32, tag = "1")]
    pub status_code: i32,
    /// Request identifier, echoed in the response.
    #[prost(uint64, tag = "3")]
    pub request_id: u64,
    /// Ordered sub-requests.
    #[prost(message, repeated, tag = "4")]
    pub requests: Vec<Request>,
    /// Opaque pass-through field, echoed verbatim.
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub unknown6: Vec<Vec<u8>>,
    /// Client latitude.
    #[prost(double, tag = "7")]
    pub latitude: f64,
    /// Client longitude.
    #[prost(double, tag = "8")]
    pub longitude: f64,
    /// Client altitude.
    #[prost(double, tag = "9")]
    pub altitude: f64,
    /// Credentials, present on the first envelope of a session.
    #[prost(message, optional, tag = "10")]
    pub auth_info: Option<AuthInfo>,
    /// Present when the client expects a fresh auth ticket.
    #[prost(message, optional, tag = "11")]
    pub auth_ticket: Option<AuthTicket>,
    /// Unused.
    #[prost(int64, tag = "12")]
    pub unknown12: i64,
}

/// A single typed sub-request.
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    /// Numeric request type, see [`RequestType`].
    #[prost(int32, tag = "1")]
    pub request_type: i32,
    /// Opaque request payload.
    #[prost(bytes = "vec", tag = "2")]
    pub request_message: Vec<u8>,
}

impl Request {
    /// Create a sub-request from a type and payload.
    pub fn new(kind: RequestType, request_message: Vec<u8>) -> Self {
        Self {
            request_type: kind.code(),
            request_message,
        }
    }

    /// Classify the numeric request type.
    pub fn kind(&self) -> RequestType {
        RequestType::from(self.request_type)
    }
}

/// Credential block.
#[derive(Clone, PartialEq, Message)]
pub struct AuthInfo {
    /// Identity provider tag, e.g. "google".
    #[prost(string, tag = "1")]
    pub provider: String,
    /// Provider token.
    #[prost(message, optional, tag = "2")]
    pub token: Option<Jwt>,
}

/// Provider token wrapper.
#[derive(Clone, PartialEq, Message)]
pub struct Jwt {
    /// Encoded token.
    #[prost(string, tag = "1")]
    pub contents: String,
    /// Unused.
    #[prost(int32, tag = "2")]
    pub unknown2: i32,
}

/// Session ticket issued by the server.
#[derive(Clone, PartialEq, Message)]
pub struct AuthTicket {
    /// Opaque leading bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub start: Vec<u8>,
    /// Expiry (ms since epoch).
    #[prost(uint64, tag = "2")]
    pub expire_timestamp_ms: u64,
    /// Opaque trailing bytes.
    #[prost(bytes = "vec", tag = "3")]
    pub end: Vec<u8>,
}

/// Payload of a GET_MAP_OBJECTS sub-request.
#[derive(Clone, PartialEq, Message)]
pub struct GetMapObjectsMessage {
    /// S2 cell ids around the player.
    #[prost(uint64, repeated, tag = "1")]
    pub cell_id: Vec<u64>,
    /// Per-cell last update times.
    #[prost(int64, repeated, tag = "2")]
    pub since_timestamp_ms: Vec<i64>,
    /// Player latitude.
    #[prost(double, tag = "3")]
    pub latitude: f64,
    /// Player longitude.
    #[prost(double, tag = "4")]
    pub longitude: f64,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Outer envelope sent back to the client.
#[derive(Clone, PartialEq, Message)]
pub struct ResponseEnvelope {
    /// Envelope status, see [`StatusCode`].
    #[prost(int32, tag = "1")]
    pub status_code: i32,
    /// Echo of the request id.
    #[prost(uint64, tag = "2")]
    pub request_id: u64,
    /// API endpoint the client should use next.
    #[prost(string, tag = "3")]
    pub api_url: String,
    /// Echo of the request pass-through field.
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub unknown6: Vec<Vec<u8>>,
    /// Fresh auth ticket, when requested.
    #[prost(message, optional, tag = "7")]
    pub auth_ticket: Option<AuthTicket>,
    /// One slot per sub-request, in request order. Empty means no payload.
    #[prost(bytes = "vec", repeated, tag = "100")]
    pub returns: Vec<Vec<u8>>,
    /// Error text.
    #[prost(string, tag = "101")]
    pub error: String,
}

/// Envelope status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StatusCode {
    /// Sub-requests were processed.
    Ok = 1,
    /// Authentication accepted; continue at `api_url`.
    Redirect = 53,
}

impl StatusCode {
    /// Wire value.
    pub fn code(self) -> i32 {
        self as i32
    }
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Request kinds this server knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// GET_PLAYER
    GetPlayer,
    /// GET_HATCHED_EGGS
    GetHatchedEggs,
    /// GET_INVENTORY
    GetInventory,
    /// CHECK_AWARDED_BADGES
    CheckAwardedBadges,
    /// DOWNLOAD_SETTINGS
    DownloadSettings,
    /// DOWNLOAD_ITEM_TEMPLATES
    DownloadItemTemplates,
    /// DOWNLOAD_REMOTE_CONFIG_VERSION
    DownloadRemoteConfigVersion,
    /// GET_ASSET_DIGEST
    GetAssetDigest,
    /// GET_PLAYER_PROFILE
    GetPlayerProfile,
    /// GET_MAP_OBJECTS
    GetMapObjects,
    /// Any other value.
    Invalid(i32),
}

impl RequestType {
    /// Every known request type.
    pub const KNOWN: [RequestType; 10] = [
        RequestType::GetPlayer,
        RequestType::GetHatchedEggs,
        RequestType::GetInventory,
        RequestType::CheckAwardedBadges,
        RequestType::DownloadSettings,
        RequestType::DownloadItemTemplates,
        RequestType::DownloadRemoteConfigVersion,
        RequestType::GetAssetDigest,
        RequestType::GetPlayerProfile,
        RequestType::GetMapObjects,
    ];

    /// Wire value.
    pub fn code(self) -> i32 {
        match self {
            RequestType::GetPlayer => 2,
            RequestType::GetInventory => 4,
            RequestType::DownloadSettings => 5,
            RequestType::DownloadItemTemplates => 6,
            RequestType::DownloadRemoteConfigVersion => 7,
            RequestType::GetMapObjects => 106,
            RequestType::GetPlayerProfile => 121,
            RequestType::GetHatchedEggs => 126,
            RequestType::CheckAwardedBadges => 129,
            RequestType::GetAssetDigest => 300,
            RequestType::Invalid(code) => code,
        }
    }

    /// Protocol name, "INVALID" for unknown values.
    pub fn name(self) -> &'static str {
        match self {
            RequestType::GetPlayer => "GET_PLAYER",
            RequestType::GetHatchedEggs => "GET_HATCHED_EGGS",
            RequestType::GetInventory => "GET_INVENTORY",
            RequestType::CheckAwardedBadges => "CHECK_AWARDED_BADGES",
            RequestType::DownloadSettings => "DOWNLOAD_SETTINGS",
            RequestType::DownloadItemTemplates => "DOWNLOAD_ITEM_TEMPLATES",
            RequestType::DownloadRemoteConfigVersion => "DOWNLOAD_REMOTE_CONFIG_VERSION",
            RequestType::GetAssetDigest => "GET_ASSET_DIGEST",
            RequestType::GetPlayerProfile => "GET_PLAYER_PROFILE",
            RequestType::GetMapObjects => "GET_MAP_OBJECTS",
            RequestType::Invalid(_) => "INVALID",
        }
    }
}

impl From<i32> for RequestType {
    fn from(code: i32) -> Self {
        RequestType::KNOWN
            .into_iter()
            .find(|kind| kind.code() == code)
            .unwrap_or(RequestType::Invalid(code))
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Envelope decoding errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffer is not a valid envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] prost::DecodeError),
}

/// Decode a request envelope. Never yields a partially parsed envelope.
///
/// An empty buffer is the all-default envelope, not an error.
pub fn decode_envelope(bytes: &[u8]) -> Result<RequestEnvelope, DecodeError> {
    Ok(RequestEnvelope::decode(bytes)?)
}

/// Encode a response envelope.
pub fn encode_envelope(envelope: &ResponseEnvelope) -> Vec<u8> {
    envelope.encode_to_vec()
}
