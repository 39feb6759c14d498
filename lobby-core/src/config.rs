use crate::remote::structs::GameType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityRange {
    pub min: u8,
    pub max: u8,
}

impl CapacityRange {
    pub fn contains(&self, capacity: u8) -> bool {
        capacity >= self.min && capacity <= self.max
    }
}

/// Local limits checked before any request leaves the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub ludo_capacity: CapacityRange,
    pub makao_capacity: CapacityRange,
    pub max_name_len: usize,
}

impl StoreConfig {
    pub fn capacity(&self, game_type: GameType) -> CapacityRange {
        match game_type {
            GameType::Ludo => self.ludo_capacity,
            GameType::Makao => self.makao_capacity,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ludo_capacity: CapacityRange { min: 2, max: 4 },
            makao_capacity: CapacityRange { min: 2, max: 8 },
            max_name_len: 32,
        }
    }
}
