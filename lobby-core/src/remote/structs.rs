use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameType {
    Ludo,
    Makao,
}

impl GameType {
    pub const ALL: [GameType; 2] = [GameType::Ludo, GameType::Makao];
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Ludo => f.write_str("LUDO"),
            GameType::Makao => f.write_str("MAKAO"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Waiting,
    Playing,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub username: String,
    pub is_online: bool,
}

/// A lobby or in-progress game as last described by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub game_type: GameType,
    pub status: SessionStatus,
    pub players: BTreeMap<String, PlayerInfo>,
    pub max_players: u8,
    pub access_code: Option<String>,
    pub is_private: bool,
}

impl Session {
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    /// Check the invariants every server description must hold.
    pub fn check(&self) -> Result<(), String> {
        if self.players.len() > self.max_players as usize {
            return Err(format!(
                "session {} has {} players for {} seats",
                self.id,
                self.players.len(),
                self.max_players
            ));
        }
        if self.access_code.is_some() != self.is_private {
            return Err(format!(
                "session {} access code does not match its privacy (private: {})",
                self.id, self.is_private
            ));
        }
        Ok(())
    }
}

/// Complete state of a session at `version`. Versions grow monotonically per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u64,
    pub session: Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: String,
    pub requester_id: String,
    pub requester_username: String,
    /// Unix millis
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInvite {
    pub id: String,
    pub sender_username: String,
    pub lobby_name: String,
    pub game_type: GameType,
    pub access_code: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendStatus {
    Online,
    Playing,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub id: String,
    pub username: String,
    pub status: FriendStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub friends: Vec<Friend>,
    pub pending_requests: Vec<FriendRequest>,
    pub invites: Vec<GameInvite>,
}

/// What an accepted invite carries over to the join path.
#[derive(Debug, Clone, PartialEq)]
pub struct InviteHandoff {
    pub invite_id: String,
    pub access_code: Option<String>,
    pub game_type: GameType,
    pub lobby_name: String,
}

impl From<GameInvite> for InviteHandoff {
    fn from(invite: GameInvite) -> Self {
        Self {
            invite_id: invite.id,
            access_code: invite.access_code,
            game_type: invite.game_type,
            lobby_name: invite.lobby_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRoomRequest {
    pub game_type: GameType,
    pub capacity: u8,
    pub name: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinRoomRequest {
    pub code: Option<String>,
    pub game_type: GameType,
    pub is_random: bool,
}
