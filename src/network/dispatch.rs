//! Request Dispatcher
//!
//! Maps each sub-request to its handler and collects one result slot per
//! sub-request, in order. Unknown types and handler failures yield an empty
//! slot; they never abort the batch.

use prost::Message;
use tracing::{debug, warn};

use crate::config::CatalogConfig;
use crate::network::payloads;
use crate::network::protocol::{GetMapObjectsMessage, Request, RequestType};
use crate::network::session::{Player, Position};

/// Result of one sub-request. `None` is an empty slot.
pub type Payload = Option<Vec<u8>>;

/// Routes sub-requests to payload producers.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    catalog: CatalogConfig,
}

impl Dispatcher {
    /// Create a dispatcher answering from `catalog`.
    pub fn new(catalog: CatalogConfig) -> Self {
        Self { catalog }
    }

    /// Process every sub-request in order. Output length equals input length.
    pub fn dispatch(&self, player: &mut Player, requests: &[Request]) -> Vec<Payload> {
        requests
            .iter()
            .map(|request| self.dispatch_one(player, request))
            .collect()
    }

    /// Process a single sub-request.
    pub fn dispatch_one(&self, player: &mut Player, request: &Request) -> Payload {
        let kind = request.kind();

        match kind {
            RequestType::GetPlayer => Some(payloads::get_player(player)),
            RequestType::GetHatchedEggs => Some(payloads::get_hatched_eggs()),
            RequestType::GetInventory => Some(payloads::get_inventory(&self.catalog)),
            RequestType::CheckAwardedBadges => Some(payloads::check_awarded_badges()),
            RequestType::DownloadSettings => Some(payloads::download_settings(&self.catalog)),
            RequestType::DownloadItemTemplates => {
                Some(payloads::download_item_templates(&self.catalog))
            }
            RequestType::DownloadRemoteConfigVersion => {
                Some(payloads::download_remote_config_version(&self.catalog))
            }
            RequestType::GetAssetDigest => Some(payloads::get_asset_digest(&self.catalog)),
            RequestType::GetPlayerProfile => Some(payloads::get_player_profile(player)),
            RequestType::GetMapObjects => {
                update_position(player, &request.request_message);
                None
            }
            RequestType::Invalid(code) => {
                warn!("Unknown request type {}, leaving slot empty", code);
                None
            }
        }
    }
}

/// Apply a GET_MAP_OBJECTS payload to the player position.
fn update_position(player: &mut Player, payload: &[u8]) {
    match GetMapObjectsMessage::decode(payload) {
        Ok(msg) => {
            player.update_position(Position::new(msg.latitude, msg.longitude));
            debug!("Player moved to ({:.6}, {:.6})", msg.latitude, msg.longitude);
        }
        Err(e) => {
            warn!("Ignoring undecodable map objects request: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::payloads::GetPlayerResponse;
    use proptest::prelude::*;

    fn map_request(latitude: f64, longitude: f64) -> Request {
        let msg = GetMapObjectsMessage {
            cell_id: vec![9926595610352287744],
            since_timestamp_ms: vec![0],
            latitude,
            longitude,
        };
        Request::new(RequestType::GetMapObjects, msg.encode_to_vec())
    }

    #[test]
    fn test_known_and_unknown_types() {
        let dispatcher = Dispatcher::default();
        let mut player = Player::new();
        let requests = vec![
            Request::new(RequestType::GetPlayer, Vec::new()),
            Request::new(RequestType::Invalid(9999), Vec::new()),
        ];

        let slots = dispatcher.dispatch(&mut player, &requests);

        assert_eq!(slots.len(), 2);
        let player_payload = slots[0].as_ref().unwrap();
        assert!(GetPlayerResponse::decode(player_payload.as_slice()).unwrap().success);
        assert!(slots[1].is_none());
    }

    #[test]
    fn test_every_known_type_answers() {
        let dispatcher = Dispatcher::default();
        let mut player = Player::new();

        for kind in RequestType::KNOWN {
            let slot = dispatcher.dispatch_one(&mut player, &Request::new(kind, Vec::new()));
            if kind == RequestType::GetMapObjects {
                assert!(slot.is_none());
            } else {
                assert!(slot.is_some(), "{} produced no payload", kind);
            }
        }
    }

    #[test]
    fn test_map_objects_updates_position() {
        let dispatcher = Dispatcher::default();
        let mut player = Player::new();

        let slots = dispatcher.dispatch(&mut player, &[map_request(40.7589, -73.9851)]);

        assert_eq!(slots, vec![None]);
        assert_eq!(player.position, Position::new(40.7589, -73.9851));
    }

    #[test]
    fn test_bad_map_payload_keeps_position() {
        let dispatcher = Dispatcher::default();
        let mut player = Player::new();
        player.update_position(Position::new(1.0, 2.0));

        let bad = Request::new(RequestType::GetMapObjects, vec![0xFF, 0xFF, 0xFF]);
        let slots = dispatcher.dispatch(&mut player, &[bad, Request::new(RequestType::GetInventory, Vec::new())]);

        assert_eq!(slots.len(), 2);
        assert!(slots[0].is_none());
        assert!(slots[1].is_some());
        assert_eq!(player.position, Position::new(1.0, 2.0));
    }

    #[test]
    fn test_later_requests_see_new_position() {
        let dispatcher = Dispatcher::default();
        let mut player = Player::new();

        dispatcher.dispatch(&mut player, &[map_request(1.5, 2.5), map_request(3.5, 4.5)]);
        assert_eq!(player.position, Position::new(3.5, 4.5));
    }

    proptest! {
        #[test]
        fn prop_slots_parallel_requests(codes in proptest::collection::vec(-5i32..400, 0..32)) {
            let dispatcher = Dispatcher::default();
            let mut player = Player::new();
            let requests: Vec<Request> = codes
                .iter()
                .map(|code| Request { request_type: *code, request_message: Vec::new() })
                .collect();

            let slots = dispatcher.dispatch(&mut player, &requests);

            prop_assert_eq!(slots.len(), requests.len());
            for (request, slot) in requests.iter().zip(&slots) {
                match request.kind() {
                    RequestType::Invalid(_) | RequestType::GetMapObjects => prop_assert!(slot.is_none()),
                    _ => prop_assert!(slot.is_some()),
                }
            }
        }
    }
}
