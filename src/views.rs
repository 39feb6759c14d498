use std::collections::VecDeque;
use std::fmt::Write;

use lobby_core::remote::structs::{FriendStatus, Session, SessionStatus};
use lobby_core::store::roster::SocialRosterStore;
use lobby_core::{Error, ErrorKind, LobbyEvent};

pub const HELP: &str = "\
Commands:
  create <ludo|makao> <players> [private] <name>
  join <ludo|makao> <code|random>
  leave | check | abandon
  accept-friend <id> | reject-friend <id> | unfriend <id>
  accept-invite <id> | decline-invite <id>
  sync | show | events | help | exit";

/// Bounded history of everything the client reported.
pub struct EventLog {
    max_size: usize,
    history: VecDeque<String>,
}

impl EventLog {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            history: VecDeque::with_capacity(max_size),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.max_size == 0 {
            return;
        }
        while self.history.len() >= self.max_size {
            self.history.pop_front();
        }
        self.history.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.history.iter()
    }
}

fn status(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Waiting => "waiting for players",
        SessionStatus::Playing => "playing",
        SessionStatus::Ended => "over",
    }
}

pub fn session(session: &Session) -> String {
    let mut out = format!(
        "{} [{}] {} ({}/{}), {}",
        session.name,
        session.game_type,
        session.id,
        session.player_count(),
        session.max_players,
        status(session.status)
    );
    if let Some(code) = &session.access_code {
        let _ = write!(out, ", code {}", code);
    }
    for player in session.players.values() {
        let marker = if player.is_online { "" } else { " (away)" };
        let _ = write!(out, "\n  - {}{}", player.username, marker);
    }
    out
}

pub fn roster(roster: &SocialRosterStore) -> String {
    let mut out = String::from("Friends:");
    for friend in roster.friends() {
        let status = match friend.status {
            FriendStatus::Online => "online",
            FriendStatus::Playing => "playing",
            FriendStatus::Offline => "offline",
        };
        let _ = write!(out, "\n  {} {} ({})", friend.id, friend.username, status);
    }
    out.push_str("\nFriend requests:");
    for request in roster.pending_requests() {
        let busy = if roster.is_busy(&request.id) { " ..." } else { "" };
        let _ = write!(out, "\n  {} from {}{}", request.id, request.requester_username, busy);
    }
    out.push_str("\nInvites:");
    for invite in roster.invites() {
        let _ = write!(
            out,
            "\n  {} {} [{}] from {}",
            invite.id, invite.lobby_name, invite.game_type, invite.sender_username
        );
    }
    out
}

pub fn event(event: &LobbyEvent) -> String {
    match event {
        LobbyEvent::SessionJoined { session: s } => format!("Joined {}", session(s)),
        LobbyEvent::SessionUpdated { session: s } => session(s),
        LobbyEvent::SessionLeft { session_id } => format!("Left {}", session_id),
        LobbyEvent::SessionEnded { session_id } => format!("Game {} is over", session_id),
        LobbyEvent::SessionGone { session_id } => format!("Lobby {} closed", session_id),
        LobbyEvent::SubscriptionLost { topic } => {
            format!("Lost live updates for {}, showing last known state", topic)
        }
        LobbyEvent::ActiveGameChecked { active: true } => {
            "You have an unfinished game. Type abandon to leave it.".to_owned()
        }
        LobbyEvent::ActiveGameChecked { active: false } => "No unfinished game".to_owned(),
        LobbyEvent::ActiveGameLeft => "Left the unfinished game".to_owned(),
        LobbyEvent::RequestFailed { request, error } => format!("{} failed: {}", request, error),
        LobbyEvent::RosterSynced => "Friends loaded".to_owned(),
        LobbyEvent::FriendRequestReceived { request } => format!(
            "Friend request {} from {}",
            request.id, request.requester_username
        ),
        LobbyEvent::FriendRequestAccepted { request_id } => {
            format!("Accepted friend request {}", request_id)
        }
        LobbyEvent::FriendRequestRejected { request_id } => {
            format!("Rejected friend request {}", request_id)
        }
        LobbyEvent::GameInviteReceived { invite } => format!(
            "{} invites you to {} [{}] ({})",
            invite.sender_username, invite.lobby_name, invite.game_type, invite.id
        ),
        LobbyEvent::FriendUpdated { friend } => {
            format!("{} is now {:?}", friend.username, friend.status)
        }
        LobbyEvent::FriendRemoved { friend_id } => format!("Removed friend {}", friend_id),
    }
}

pub fn error(err: &Error) -> String {
    match **err {
        ErrorKind::AlreadyInProgress(_) => format!("Please wait: {}", err),
        _ => err.to_string(),
    }
}
