//! JSON wire protocol.
//!
//! Every WebSocket text frame carries one message encoded as
//! `{"event": "<name>", "data": <payload>}`; events without a payload omit
//! `data`. Event names and payload field names are camelCase.

use crate::{Account, EnemyKind, Inventory, ItemKind, Rarity, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Intents sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Binds this session to an account in the account store.
    Authenticate { account_id: String },
    /// Overwrites the sender's position.
    Move(Vec3),
    EnemyDamaged {
        enemy_id: u32,
        damage: f32,
        #[serde(default)]
        knockback: Vec2,
    },
    PlayerDamaged { damage: f32 },
    RequestHealthSync,
    RequestLightingConfig,
    RequestInventory,
    CollectItem { item_id: u32 },
    UpdateInventory {
        action: InventoryAction,
        base_type: String,
        rarity: Rarity,
        #[serde(default = "default_count")]
        count: u32,
    },
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryAction {
    Add,
    Remove,
}

/// Events sent by the server, either to one connection or broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Full world state, sent once to a newly connected client.
    WorldSnapshot {
        self_id: u32,
        players: Vec<PlayerView>,
        enemies: Vec<EnemyView>,
        items: Vec<ItemView>,
        wave: u32,
        min_rarity: Rarity,
    },
    PlayerJoined(PlayerView),
    PlayerLeft { player_id: u32 },
    PlayerMoved { player_id: u32, position: Vec3 },
    PlayerDamaged { player_id: u32, health: f32 },
    HealthSync { health: f32, max_health: f32 },
    #[serde(rename = "playerXP")]
    PlayerXp {
        player_id: u32,
        amount: u64,
        total_xp: u64,
    },

    EnemySpawned(EnemyView),
    EnemyMoved {
        enemy_id: u32,
        position: Vec3,
        rotation: f32,
    },
    EnemyDamaged {
        enemy_id: u32,
        health: f32,
        max_health: f32,
    },
    /// `drop` is `None` when the enemy was cleared rather than killed or
    /// when the drop roll came up empty.
    EnemyDied {
        enemy_id: u32,
        drop: Option<ItemView>,
    },

    WaveStart { wave: u32, min_rarity: Rarity },

    /// Broadcast the moment a player hits zero health; clients freeze them.
    PlayerDeathSequence { player_id: u32 },
    PlayerDied(DeathSummary),
    ShowDeathScreen(DeathSummary),
    DeathScreenComplete,

    ItemSpawned(ItemView),
    ItemCollectionConfirmed {
        item_id: u32,
        player_id: u32,
        item_type: ItemKind,
        rarity: Rarity,
    },
    InventorySync(Inventory),
    InventoryUpdateConfirmed {
        success: bool,
        inventory: Inventory,
        message: Option<String>,
    },
    AccountSync(Account),
    ConfigUpdate(Value),
    LightingConfig(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: u32,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub xp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyView {
    pub id: u32,
    #[serde(rename = "type")]
    pub enemy_type: EnemyKind,
    pub rarity: Rarity,
    pub position: Vec3,
    pub rotation: f32,
    pub health: f32,
    pub max_health: f32,
    pub size: f32,
    pub is_aggressive: bool,
    pub follows_id: Option<u32>,
    pub centipede_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: u32,
    pub item_type: ItemKind,
    pub rarity: Rarity,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeathSummary {
    pub wave: u32,
    pub xp: u64,
    pub kills: u32,
    pub survived_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_move_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"event":"move","data":{"x":1.0,"y":0.5,"z":-2.0}}"#).unwrap();
        assert_eq!(msg, ClientMessage::Move(Vec3::new(1.0, 0.5, -2.0)));
    }

    #[test]
    fn test_enemy_damaged_wire_format() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "enemyDamaged",
            "data": { "enemyId": 7, "damage": 12.5, "knockback": { "x": 0.1, "z": -0.2 } }
        }))
        .unwrap();

        match msg {
            ClientMessage::EnemyDamaged {
                enemy_id,
                damage,
                knockback,
            } => {
                assert_eq!(enemy_id, 7);
                assert_eq!(damage, 12.5);
                assert_eq!(knockback, Vec2::new(0.1, -0.2));
            }
            _ => panic!("Wrong message type after deserialization"),
        }
    }

    #[test]
    fn test_payloadless_requests() {
        let msg: ClientMessage = serde_json::from_str(r#"{"event":"requestHealthSync"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RequestHealthSync);
        let msg: ClientMessage =
            serde_json::from_str(r#"{"event":"requestLightingConfig"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RequestLightingConfig);
    }

    #[test]
    fn test_update_inventory_defaults_count() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "updateInventory",
            "data": { "action": "remove", "baseType": "leaf", "rarity": "rare" }
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::UpdateInventory {
                action: InventoryAction::Remove,
                base_type: "leaf".to_string(),
                rarity: Rarity::Rare,
                count: 1,
            }
        );
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"event":"teleport","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_names() {
        let value = serde_json::to_value(ServerMessage::WaveStart {
            wave: 3,
            min_rarity: Rarity::Common,
        })
        .unwrap();
        assert_eq!(value, json!({"event": "waveStart", "data": {"wave": 3, "minRarity": "common"}}));

        let value = serde_json::to_value(ServerMessage::PlayerXp {
            player_id: 1,
            amount: 5,
            total_xp: 10,
        })
        .unwrap();
        assert_eq!(value["event"], "playerXP");
        assert_eq!(value["data"]["totalXp"], 10);

        let value = serde_json::to_value(ServerMessage::DeathScreenComplete).unwrap();
        assert_eq!(value["event"], "deathScreenComplete");
    }

    #[test]
    fn test_enemy_view_uses_type_key() {
        let view = EnemyView {
            id: 1,
            enemy_type: EnemyKind::CentipedeSegment,
            rarity: Rarity::Epic,
            position: Vec3::default(),
            rotation: 0.0,
            health: 10.0,
            max_health: 10.0,
            size: 0.5,
            is_aggressive: false,
            follows_id: Some(0),
            centipede_id: Some(0),
        };
        let value = serde_json::to_value(ServerMessage::EnemySpawned(view)).unwrap();
        assert_eq!(value["event"], "enemySpawned");
        assert_eq!(value["data"]["type"], "centipede_segment");
        assert_eq!(value["data"]["followsId"], 0);
    }
}
