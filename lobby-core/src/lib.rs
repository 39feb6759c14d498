use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use log::warn;

use crate::config::StoreConfig;
use crate::remote::gateway::{RemoteSessionGateway, SocialGateway};
use crate::remote::structs::{Friend, FriendRequest, GameInvite, InviteHandoff, Session};
use crate::remote::subscription::{EventSubscription, Topic};
use crate::remote::GatewayError;
use crate::store::roster::SocialRosterStore;
use crate::store::session::SessionMembershipStore;

pub mod config;
pub mod remote;
pub mod store;
pub mod utils;

#[cfg(test)]
mod testing;

#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    SessionJoined { session: Session },
    SessionUpdated { session: Session },
    SessionLeft { session_id: String },
    SessionEnded { session_id: String },
    /// The server answered that the session does not exist anymore
    SessionGone { session_id: String },
    SubscriptionLost { topic: Topic },
    ActiveGameChecked { active: bool },
    ActiveGameLeft,
    RequestFailed { request: Request, error: GatewayError },
    RosterSynced,
    FriendRequestReceived { request: FriendRequest },
    FriendRequestAccepted { request_id: String },
    FriendRequestRejected { request_id: String },
    GameInviteReceived { invite: GameInvite },
    FriendUpdated { friend: Friend },
    FriendRemoved { friend_id: String },
}

/// Remote calls whose outcome is reported back through [`LobbyEvent::RequestFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateSession,
    JoinSession,
    LeaveSession,
    CheckActiveGame,
    LeaveActiveGame,
    SyncRoster,
    AcceptFriendRequest(String),
    RejectFriendRequest(String),
    RemoveFriend(String),
    AcceptGameInvite(String),
    DeclineGameInvite(String),
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::CreateSession => f.write_str("Creating the lobby"),
            Request::JoinSession => f.write_str("Joining the lobby"),
            Request::LeaveSession => f.write_str("Leaving the lobby"),
            Request::CheckActiveGame => f.write_str("Checking for an unfinished game"),
            Request::LeaveActiveGame => f.write_str("Leaving the unfinished game"),
            Request::SyncRoster => f.write_str("Loading friends"),
            Request::AcceptFriendRequest(id) => write!(f, "Accepting friend request {}", id),
            Request::RejectFriendRequest(id) => write!(f, "Rejecting friend request {}", id),
            Request::RemoveFriend(id) => write!(f, "Removing friend {}", id),
            Request::AcceptGameInvite(id) => write!(f, "Accepting invite {}", id),
            Request::DeclineGameInvite(id) => write!(f, "Declining invite {}", id),
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

pub type Error = Box<ErrorKind>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    /// Bad local input, nothing was sent
    #[error("{0}")]
    Validation(String),
    #[error("{0} is already in progress")]
    AlreadyInProgress(String),
    /// The entry or session is not known locally anymore
    #[error("{0}")]
    StaleState(String),
    /// Entering a session is not possible right now
    #[error("{0}")]
    SessionBlocked(String),
    #[error("{0}")]
    Codec(String),
    #[error("{0}")]
    Config(String),
}

/// Everything the lobby screens need for one logged-in player. Build it at login,
/// drop it at logout: dropping unsubscribes and discards late gateway replies.
pub struct LobbyClient {
    session: SessionMembershipStore,
    roster: SocialRosterStore,
    events: VecDeque<LobbyEvent>,
}

impl LobbyClient {
    pub fn new(
        config: StoreConfig,
        sessions: Rc<dyn RemoteSessionGateway>,
        social: Rc<dyn SocialGateway>,
        subscriptions: Rc<dyn EventSubscription>,
    ) -> Self {
        let mut roster = SocialRosterStore::new(social, subscriptions.as_ref());
        roster.sync();
        Self {
            session: SessionMembershipStore::new(config, sessions, subscriptions),
            roster,
            events: VecDeque::new(),
        }
    }

    pub fn session(&self) -> &SessionMembershipStore {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionMembershipStore {
        &mut self.session
    }

    pub fn roster(&self) -> &SocialRosterStore {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut SocialRosterStore {
        &mut self.roster
    }

    pub fn tick(&mut self) {
        self.session.tick();
        self.roster.tick();
        self.events.extend(self.session.drain_events());
        self.events.extend(self.roster.drain_events());
    }

    pub fn poll_events(&mut self, events: &mut Vec<LobbyEvent>) {
        store::fill_events(&mut self.events, events);
    }

    /// Consume the invite and join its lobby. The invite is not given back when the
    /// join fails, the sender has to invite again.
    pub fn accept_game_invite_and_join(&mut self, invite_id: &str) -> Result<InviteHandoff> {
        self.session.can_enter()?;
        let handoff = self.roster.accept_game_invite(invite_id)?;
        if let Err(err) = self.session.join_session(
            handoff.access_code.as_deref(),
            false,
            handoff.game_type,
        ) {
            warn!(
                "Invite {} consumed but joining {} failed: {}",
                invite_id, handoff.lobby_name, err
            );
            return Err(err);
        }
        Ok(handoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::structs::{GameType, RosterSnapshot, SessionStatus};
    use crate::testing::{invite, FakeGateway, FakeSubscriptions};

    fn client(gateway: &Rc<FakeGateway>, subscriptions: &Rc<FakeSubscriptions>) -> LobbyClient {
        LobbyClient::new(
            StoreConfig::default(),
            gateway.clone(),
            gateway.clone(),
            subscriptions.clone(),
        )
    }

    fn events(client: &mut LobbyClient) -> Vec<LobbyEvent> {
        let mut events = Vec::with_capacity(64);
        client.poll_events(&mut events);
        events
    }

    #[test]
    fn login_syncs_roster() {
        let gateway = Rc::new(FakeGateway::new());
        gateway.set_roster(RosterSnapshot {
            invites: vec![invite("i1", Some("ABCD"), GameType::Makao)],
            ..RosterSnapshot::default()
        });
        let subscriptions = Rc::new(FakeSubscriptions::new());
        let mut client = client(&gateway, &subscriptions);
        client.tick();

        assert_eq!(client.roster().invites().len(), 1);
        assert!(subscriptions.is_subscribed(&Topic::Roster));
        assert_eq!(events(&mut client), vec![LobbyEvent::RosterSynced]);
    }

    #[test]
    fn failed_join_after_invite_does_not_restore_invite() {
        let gateway = Rc::new(FakeGateway::new());
        gateway.set_roster(RosterSnapshot {
            invites: vec![invite("i1", Some("ABCD"), GameType::Makao)],
            ..RosterSnapshot::default()
        });
        let subscriptions = Rc::new(FakeSubscriptions::new());
        let mut client = client(&gateway, &subscriptions);
        client.tick();
        events(&mut client);

        gateway.fail_next("join_room", GatewayError::not_found("Lobby not found"));
        let handoff = client.accept_game_invite_and_join("i1").unwrap();
        assert_eq!(handoff.access_code.as_deref(), Some("ABCD"));
        assert_eq!(handoff.game_type, GameType::Makao);
        assert!(gateway.called("join_room:ABCD:MAKAO"));

        client.tick();
        assert!(client.session().session().is_none());
        assert!(client.roster().invites().is_empty());
        assert_eq!(
            events(&mut client),
            vec![LobbyEvent::RequestFailed {
                request: Request::JoinSession,
                error: GatewayError::not_found("Lobby not found"),
            }]
        );
    }

    #[test]
    fn invite_without_code_is_consumed_and_rejected() {
        let gateway = Rc::new(FakeGateway::new());
        gateway.set_roster(RosterSnapshot {
            invites: vec![invite("i1", None, GameType::Ludo)],
            ..RosterSnapshot::default()
        });
        let subscriptions = Rc::new(FakeSubscriptions::new());
        let mut client = client(&gateway, &subscriptions);
        client.tick();

        let err = client.accept_game_invite_and_join("i1").unwrap_err();
        assert!(matches!(*err, ErrorKind::Validation(_)));
        assert!(client.roster().invites().is_empty());
        assert!(!gateway.called_prefix("join_room"));
    }

    #[test]
    fn invite_is_kept_while_already_in_a_session() {
        let gateway = Rc::new(FakeGateway::new());
        gateway.set_roster(RosterSnapshot {
            invites: vec![invite("i1", Some("ABCD"), GameType::Ludo)],
            ..RosterSnapshot::default()
        });
        let subscriptions = Rc::new(FakeSubscriptions::new());
        let mut client = client(&gateway, &subscriptions);
        client
            .session_mut()
            .create_session(GameType::Ludo, 4, "Arena1", false)
            .unwrap();
        client.tick();
        assert_eq!(
            client.session().session().map(|s| s.status),
            Some(SessionStatus::Waiting)
        );

        let err = client.accept_game_invite_and_join("i1").unwrap_err();
        assert!(matches!(*err, ErrorKind::SessionBlocked(_)));
        assert_eq!(client.roster().invites().len(), 1);
    }

    #[test]
    fn poll_events_respects_capacity() {
        let gateway = Rc::new(FakeGateway::new());
        let subscriptions = Rc::new(FakeSubscriptions::new());
        let mut client = client(&gateway, &subscriptions);
        client.session_mut().check_active_session();
        client.tick();

        let mut events = Vec::with_capacity(1);
        client.poll_events(&mut events);
        assert_eq!(events.len(), 1);
        client.poll_events(&mut events);
        assert_eq!(events.len(), 1);
        client.poll_events(&mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn replies_after_logout_are_dropped() {
        let gateway = Rc::new(FakeGateway::new());
        gateway.hold_replies(true);
        let subscriptions = Rc::new(FakeSubscriptions::new());
        let mut client = client(&gateway, &subscriptions);
        client
            .session_mut()
            .create_session(GameType::Ludo, 2, "Arena1", false)
            .unwrap();
        drop(client);

        assert_eq!(gateway.release_held(), 2);
        assert!(!subscriptions.is_subscribed(&Topic::Roster));
    }
}
