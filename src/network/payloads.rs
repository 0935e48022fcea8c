//! Response Payloads
//!
//! Typed constructors for every response slot the dispatcher can fill.
//! Each builder returns the encoded message, ready to drop into
//! [`ResponseEnvelope::returns`](super::protocol::ResponseEnvelope).

use chrono::Utc;
use prost::Message;
use std::time::Duration;

use crate::config::CatalogConfig;
use crate::network::protocol::AuthTicket;
use crate::network::session::Player;

/// Currency names used in player data.
pub const POKECOIN: &str = "POKECOIN";
/// Currency names used in player data.
pub const STARDUST: &str = "STARDUST";

/// Result value for responses that report success as an enum.
const RESULT_SUCCESS: i32 = 1;

// =============================================================================
// MESSAGES
// =============================================================================

/// GET_PLAYER response.
#[derive(Clone, PartialEq, Message)]
pub struct GetPlayerResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(message, optional, tag = "2")]
    pub player_data: Option<PlayerData>,
}

/// Player summary.
#[derive(Clone, PartialEq, Message)]
pub struct PlayerData {
    #[prost(int64, tag = "1")]
    pub creation_timestamp_ms: i64,
    #[prost(string, tag = "2")]
    pub username: String,
    #[prost(int32, tag = "5")]
    pub team: i32,
    #[prost(message, repeated, tag = "14")]
    pub currencies: Vec<Currency>,
}

/// Named currency balance.
#[derive(Clone, PartialEq, Message)]
pub struct Currency {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub amount: i32,
}

/// GET_HATCHED_EGGS response.
#[derive(Clone, PartialEq, Message)]
pub struct GetHatchedEggsResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(uint64, repeated, tag = "2")]
    pub pokemon_id: Vec<u64>,
    #[prost(int32, repeated, tag = "3")]
    pub experience_awarded: Vec<i32>,
    #[prost(int32, repeated, tag = "4")]
    pub candy_awarded: Vec<i32>,
    #[prost(int32, repeated, tag = "5")]
    pub stardust_awarded: Vec<i32>,
}

/// GET_INVENTORY response.
#[derive(Clone, PartialEq, Message)]
pub struct GetInventoryResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(message, optional, tag = "2")]
    pub inventory_delta: Option<InventoryDelta>,
}

/// Inventory changes since the client's last sync.
#[derive(Clone, PartialEq, Message)]
pub struct InventoryDelta {
    #[prost(int64, tag = "1")]
    pub original_timestamp_ms: i64,
    #[prost(int64, tag = "2")]
    pub new_timestamp_ms: i64,
}

/// CHECK_AWARDED_BADGES response.
#[derive(Clone, PartialEq, Message)]
pub struct CheckAwardedBadgesResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(int32, repeated, tag = "2")]
    pub awarded_badges: Vec<i32>,
    #[prost(int32, repeated, tag = "3")]
    pub awarded_badge_levels: Vec<i32>,
}

/// DOWNLOAD_SETTINGS response.
#[derive(Clone, PartialEq, Message)]
pub struct DownloadSettingsResponse {
    #[prost(string, tag = "1")]
    pub error: String,
    #[prost(string, tag = "2")]
    pub hash: String,
}

/// DOWNLOAD_ITEM_TEMPLATES response.
#[derive(Clone, PartialEq, Message)]
pub struct DownloadItemTemplatesResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(uint64, tag = "3")]
    pub timestamp_ms: u64,
}

/// DOWNLOAD_REMOTE_CONFIG_VERSION response.
#[derive(Clone, PartialEq, Message)]
pub struct DownloadRemoteConfigVersionResponse {
    #[prost(int32, tag = "1")]
    pub result: i32,
    #[prost(uint64, tag = "2")]
    pub item_templates_timestamp_ms: u64,
    #[prost(uint64, tag = "3")]
    pub asset_digest_timestamp_ms: u64,
}

/// GET_ASSET_DIGEST response.
#[derive(Clone, PartialEq, Message)]
pub struct GetAssetDigestResponse {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub digest: Vec<Vec<u8>>,
    #[prost(uint64, tag = "2")]
    pub timestamp_ms: u64,
}

/// GET_PLAYER_PROFILE response.
#[derive(Clone, PartialEq, Message)]
pub struct GetPlayerProfileResponse {
    #[prost(int32, tag = "1")]
    pub result: i32,
    #[prost(int64, tag = "2")]
    pub start_time: i64,
    #[prost(int32, repeated, tag = "3")]
    pub badges: Vec<i32>,
}

// =============================================================================
// BUILDERS
// =============================================================================

/// Build the GET_PLAYER payload from the player context.
pub fn get_player(player: &Player) -> Vec<u8> {
    GetPlayerResponse {
        success: true,
        player_data: Some(PlayerData {
            creation_timestamp_ms: player.created_at.timestamp_millis(),
            username: player.username(),
            team: player.team,
            currencies: vec![
                Currency { name: POKECOIN.to_string(), amount: player.pokecoins },
                Currency { name: STARDUST.to_string(), amount: player.stardust },
            ],
        }),
    }
    .encode_to_vec()
}

/// Build the GET_HATCHED_EGGS payload.
pub fn get_hatched_eggs() -> Vec<u8> {
    GetHatchedEggsResponse {
        success: true,
        ..Default::default()
    }
    .encode_to_vec()
}

/// Build the GET_INVENTORY payload.
pub fn get_inventory(catalog: &CatalogConfig) -> Vec<u8> {
    GetInventoryResponse {
        success: true,
        inventory_delta: Some(InventoryDelta {
            original_timestamp_ms: 0,
            new_timestamp_ms: catalog.inventory_timestamp_ms,
        }),
    }
    .encode_to_vec()
}

/// Build the CHECK_AWARDED_BADGES payload.
pub fn check_awarded_badges() -> Vec<u8> {
    CheckAwardedBadgesResponse {
        success: true,
        ..Default::default()
    }
    .encode_to_vec()
}

/// Build the DOWNLOAD_SETTINGS payload.
pub fn download_settings(catalog: &CatalogConfig) -> Vec<u8> {
    DownloadSettingsResponse {
        error: String::new(),
        hash: catalog.settings_hash.clone(),
    }
    .encode_to_vec()
}

/// Build the DOWNLOAD_ITEM_TEMPLATES payload.
pub fn download_item_templates(catalog: &CatalogConfig) -> Vec<u8> {
    DownloadItemTemplatesResponse {
        success: true,
        timestamp_ms: catalog.item_templates_timestamp_ms,
    }
    .encode_to_vec()
}

/// Build the DOWNLOAD_REMOTE_CONFIG_VERSION payload.
pub fn download_remote_config_version(catalog: &CatalogConfig) -> Vec<u8> {
    DownloadRemoteConfigVersionResponse {
        result: RESULT_SUCCESS,
        item_templates_timestamp_ms: catalog.item_templates_timestamp_ms,
        asset_digest_timestamp_ms: catalog.asset_digest_timestamp_ms,
    }
    .encode_to_vec()
}

/// Build the GET_ASSET_DIGEST payload.
pub fn get_asset_digest(catalog: &CatalogConfig) -> Vec<u8> {
    GetAssetDigestResponse {
        digest: Vec::new(),
        timestamp_ms: catalog.asset_digest_timestamp_ms,
    }
    .encode_to_vec()
}

/// Build the GET_PLAYER_PROFILE payload.
pub fn get_player_profile(player: &Player) -> Vec<u8> {
    GetPlayerProfileResponse {
        result: RESULT_SUCCESS,
        start_time: player.created_at.timestamp_millis(),
        badges: Vec::new(),
    }
    .encode_to_vec()
}

/// Issue a fresh auth ticket valid for `ttl`.
pub fn auth_ticket(ttl: Duration) -> AuthTicket {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    let now_ms = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);

    AuthTicket {
        start: uuid::Uuid::new_v4().as_bytes().to_vec(),
        expire_timestamp_ms: now_ms.saturating_add(ttl_ms),
        end: uuid::Uuid::new_v4().as_bytes().to_vec(),
    }
}
