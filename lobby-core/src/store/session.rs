use std::collections::vec_deque::Drain;
use std::collections::VecDeque;
use std::rc::Rc;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::remote::gateway::RemoteSessionGateway;
use crate::remote::structs::{
    CreateRoomRequest, GameType, JoinRoomRequest, Session, SessionSnapshot, SessionStatus,
};
use crate::remote::subscription::{
    push_channel, EventSubscription, Push, SessionPush, SubscriptionHandle, Topic,
};
use crate::remote::{reply_channel, GatewayError, GatewayErrorKind, Reply};
use crate::{ErrorKind, LobbyEvent, Request, Result};

/// A create or join waiting for the gateway.
struct Transition {
    request: Request,
    reply: Reply<Session>,
}

struct Membership {
    session: Session,
    last_version: Option<u64>,
    subscription: SubscriptionHandle,
    pushes: Receiver<Push>,
    connected: bool,
}

enum PushOutcome {
    Ignored,
    Updated,
    Notify(LobbyEvent),
    Cleared(LobbyEvent),
}

/// Tracks the one session the player is in and keeps it in line with the server.
///
/// Gateway replies and pushed snapshots are only applied from [`tick`](Self::tick), in the
/// order they were delivered.
pub struct SessionMembershipStore {
    config: StoreConfig,
    gateway: Rc<dyn RemoteSessionGateway>,
    subscriptions: Rc<dyn EventSubscription>,
    membership: Option<Membership>,
    transition: Option<Transition>,
    active_check: Option<Reply<bool>>,
    active_game_elsewhere: Option<bool>,
    leave_active: Option<Reply<()>>,
    leaves: Vec<Reply<()>>,
    events: VecDeque<LobbyEvent>,
}

impl SessionMembershipStore {
    pub fn new(
        config: StoreConfig,
        gateway: Rc<dyn RemoteSessionGateway>,
        subscriptions: Rc<dyn EventSubscription>,
    ) -> Self {
        Self {
            config,
            gateway,
            subscriptions,
            membership: None,
            transition: None,
            active_check: None,
            active_game_elsewhere: None,
            leave_active: None,
            leaves: Vec::new(),
            events: VecDeque::new(),
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.membership.as_ref().map(|m| &m.session)
    }

    /// `None` until a check came back.
    pub fn active_game_elsewhere(&self) -> Option<bool> {
        self.active_game_elsewhere
    }

    pub fn is_entering(&self) -> bool {
        self.transition.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.membership.as_ref().map_or(false, |m| m.connected)
    }

    /// Whether a create or join would be let through right now.
    pub fn can_enter(&self) -> Result<()> {
        if let Some(transition) = &self.transition {
            return Err(Box::new(ErrorKind::AlreadyInProgress(
                transition.request.to_string(),
            )));
        }
        if let Some(membership) = &self.membership {
            return Err(Box::new(ErrorKind::SessionBlocked(format!(
                "Already in lobby {}, leave it first",
                membership.session.name
            ))));
        }
        if self.active_check.is_some() {
            return Err(Box::new(ErrorKind::AlreadyInProgress(
                Request::CheckActiveGame.to_string(),
            )));
        }
        if self.active_game_elsewhere == Some(true) {
            return Err(Box::new(ErrorKind::SessionBlocked(
                "You have an unfinished game, leave it before starting another".to_owned(),
            )));
        }
        Ok(())
    }

    pub fn create_session(
        &mut self,
        game_type: GameType,
        capacity: u8,
        name: &str,
        is_private: bool,
    ) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Box::new(ErrorKind::Validation(
                "Lobby name cannot be empty".to_owned(),
            )));
        }
        if name.chars().count() > self.config.max_name_len {
            return Err(Box::new(ErrorKind::Validation(format!(
                "Lobby name cannot be longer than {} characters",
                self.config.max_name_len
            ))));
        }
        let range = self.config.capacity(game_type);
        if !range.contains(capacity) {
            return Err(Box::new(ErrorKind::Validation(format!(
                "{} lobbies take {} to {} players",
                game_type, range.min, range.max
            ))));
        }
        self.can_enter()?;

        info!(
            "Creating {} lobby {} for {} players (private: {})",
            game_type, name, capacity, is_private
        );
        let (responder, reply) = reply_channel();
        self.gateway.create_room(
            CreateRoomRequest {
                game_type,
                capacity,
                name: name.to_owned(),
                is_private,
            },
            responder,
        );
        self.transition = Some(Transition {
            request: Request::CreateSession,
            reply,
        });
        Ok(())
    }

    /// Join by access code, or a random public lobby. Exactly one of the two.
    pub fn join_session(
        &mut self,
        code: Option<&str>,
        random: bool,
        game_type: GameType,
    ) -> Result<()> {
        let code = code.map(str::trim).filter(|code| !code.is_empty());
        let code = match (code, random) {
            (Some(code), false) => Some(code.to_owned()),
            (None, true) => None,
            (Some(_), true) => {
                return Err(Box::new(ErrorKind::Validation(
                    "Pick either an access code or a random lobby, not both".to_owned(),
                )))
            }
            (None, false) => {
                return Err(Box::new(ErrorKind::Validation(
                    "An access code or a random lobby is required".to_owned(),
                )))
            }
        };
        self.can_enter()?;

        info!(
            "Joining {} lobby {}",
            game_type,
            code.as_deref().unwrap_or("at random")
        );
        let (responder, reply) = reply_channel();
        self.gateway.join_room(
            JoinRoomRequest {
                code,
                game_type,
                is_random: random,
            },
            responder,
        );
        self.transition = Some(Transition {
            request: Request::JoinSession,
            reply,
        });
        Ok(())
    }

    /// Leave locally right away. The gateway is told afterwards and its failures are only
    /// reported.
    pub fn leave_session(&mut self) -> Result<()> {
        let (responder, reply) = reply_channel();
        if let Some(membership) = self.membership.take() {
            let session_id = membership.session.id.clone();
            let playing = membership.session.status == SessionStatus::Playing;
            membership.subscription.unsubscribe();
            info!("Leaving session {}", session_id);
            if playing {
                self.gateway.leave_game(responder);
            } else {
                self.gateway.leave_room(responder);
            }
            self.events.push_back(LobbyEvent::SessionLeft { session_id });
        } else if let Some(transition) = self.transition.take() {
            info!("{} abandoned, its reply will be discarded", transition.request);
            self.gateway.leave_room(responder);
        } else {
            return Err(Box::new(ErrorKind::StaleState(
                "Not in a lobby".to_owned(),
            )));
        }
        self.leaves.push(reply);
        Ok(())
    }

    /// Ask whether an unfinished game is waiting elsewhere. Repeated calls while the
    /// answer is pending are no-ops.
    pub fn check_active_session(&mut self) {
        if self.active_check.is_some() {
            debug!("Active game check already pending");
            return;
        }
        let (responder, reply) = reply_channel();
        self.gateway.check_active_game(responder);
        self.active_check = Some(reply);
    }

    pub fn leave_active_game(&mut self) -> Result<()> {
        if self.leave_active.is_some() {
            return Err(Box::new(ErrorKind::AlreadyInProgress(
                Request::LeaveActiveGame.to_string(),
            )));
        }
        if self.active_game_elsewhere != Some(true) {
            return Err(Box::new(ErrorKind::StaleState(
                "No unfinished game to leave".to_owned(),
            )));
        }
        let (responder, reply) = reply_channel();
        self.gateway.leave_game(responder);
        self.leave_active = Some(reply);
        Ok(())
    }

    pub fn on_push(&mut self, push: SessionPush) {
        let outcome = match self.membership.as_mut() {
            Some(membership) => Self::apply_push(membership, push),
            None => {
                debug!("Dropping push {:?}, not in a session", push);
                PushOutcome::Ignored
            }
        };
        match outcome {
            PushOutcome::Ignored => {}
            PushOutcome::Updated => {
                if let Some(membership) = &self.membership {
                    self.events.push_back(LobbyEvent::SessionUpdated {
                        session: membership.session.clone(),
                    });
                }
            }
            PushOutcome::Notify(event) => self.events.push_back(event),
            PushOutcome::Cleared(event) => {
                if let Some(membership) = self.membership.take() {
                    membership.subscription.unsubscribe();
                }
                self.events.push_back(event);
            }
        }
    }

    fn apply_push(membership: &mut Membership, push: SessionPush) -> PushOutcome {
        match push {
            SessionPush::Snapshot(snapshot) => Self::apply_snapshot(membership, snapshot),
            SessionPush::NotFound { session_id } if session_id == membership.session.id => {
                info!("Session {} not found anymore", session_id);
                PushOutcome::Cleared(LobbyEvent::SessionGone { session_id })
            }
            SessionPush::NotFound { session_id } => {
                debug!("Ignoring not-found for foreign session {}", session_id);
                PushOutcome::Ignored
            }
            SessionPush::Disconnected => {
                if !membership.connected {
                    return PushOutcome::Ignored;
                }
                warn!(
                    "Lost updates for session {}, keeping last known state",
                    membership.session.id
                );
                membership.connected = false;
                PushOutcome::Notify(LobbyEvent::SubscriptionLost {
                    topic: membership.subscription.topic().clone(),
                })
            }
        }
    }

    fn apply_snapshot(membership: &mut Membership, snapshot: SessionSnapshot) -> PushOutcome {
        if snapshot.session.id != membership.session.id {
            debug!(
                "Ignoring snapshot for foreign session {}",
                snapshot.session.id
            );
            return PushOutcome::Ignored;
        }
        if let Some(last) = membership.last_version {
            if snapshot.version <= last {
                debug!(
                    "Dropping stale snapshot v{} of {}, v{} already applied",
                    snapshot.version, snapshot.session.id, last
                );
                return PushOutcome::Ignored;
            }
        }
        if let Err(reason) = snapshot.session.check() {
            warn!("Dropping snapshot v{}: {}", snapshot.version, reason);
            return PushOutcome::Ignored;
        }

        membership.last_version = Some(snapshot.version);
        membership.connected = true;
        if snapshot.session.status == SessionStatus::Ended {
            info!("Session {} ended", snapshot.session.id);
            return PushOutcome::Cleared(LobbyEvent::SessionEnded {
                session_id: snapshot.session.id,
            });
        }
        membership.session = snapshot.session;
        PushOutcome::Updated
    }

    pub fn tick(&mut self) {
        self.poll_transition();
        self.poll_active_check();
        self.poll_leaves();
        self.poll_pushes();
    }

    pub fn poll_events(&mut self, events: &mut Vec<LobbyEvent>) {
        crate::store::fill_events(&mut self.events, events);
    }

    pub(crate) fn drain_events(&mut self) -> Drain<'_, LobbyEvent> {
        self.events.drain(..)
    }

    fn poll_transition(&mut self) {
        let result = match self.transition.as_ref().and_then(|t| t.reply.poll()) {
            Some(result) => result,
            None => return,
        };
        let request = match self.transition.take() {
            Some(transition) => transition.request,
            None => return,
        };
        let result = result.and_then(|session| match session.check() {
            Ok(()) => Ok(session),
            Err(reason) => Err(GatewayError::new(GatewayErrorKind::Malformed, reason)),
        });
        match result {
            Ok(session) => self.enter(request, session),
            Err(error) => {
                error!("{} failed: {}", request, error);
                self.events
                    .push_back(LobbyEvent::RequestFailed { request, error });
            }
        }
    }

    fn enter(&mut self, request: Request, mut session: Session) {
        if request == Request::CreateSession {
            session.status = SessionStatus::Waiting;
        }
        let topic = Topic::Session(session.id.clone());
        let (sink, pushes) = push_channel(topic.clone());
        let subscription = self.subscriptions.subscribe(topic, sink);
        info!(
            "Entered {} lobby {} ({}/{} players)",
            session.game_type,
            session.name,
            session.player_count(),
            session.max_players
        );
        self.events.push_back(LobbyEvent::SessionJoined {
            session: session.clone(),
        });
        self.membership = Some(Membership {
            session,
            last_version: None,
            subscription,
            pushes,
            connected: true,
        });
    }

    fn poll_active_check(&mut self) {
        if let Some(result) = self.active_check.as_ref().and_then(Reply::poll) {
            self.active_check = None;
            match result {
                Ok(active) => {
                    debug!("Unfinished game elsewhere: {}", active);
                    self.active_game_elsewhere = Some(active);
                    self.events
                        .push_back(LobbyEvent::ActiveGameChecked { active });
                }
                Err(error) => {
                    error!("{} failed: {}", Request::CheckActiveGame, error);
                    self.events.push_back(LobbyEvent::RequestFailed {
                        request: Request::CheckActiveGame,
                        error,
                    });
                }
            }
        }
        if let Some(result) = self.leave_active.as_ref().and_then(Reply::poll) {
            self.leave_active = None;
            match result {
                Ok(()) => {
                    info!("Left unfinished game");
                    self.active_game_elsewhere = Some(false);
                    self.events.push_back(LobbyEvent::ActiveGameLeft);
                }
                Err(error) => {
                    error!("{} failed: {}", Request::LeaveActiveGame, error);
                    self.events.push_back(LobbyEvent::RequestFailed {
                        request: Request::LeaveActiveGame,
                        error,
                    });
                }
            }
        }
    }

    fn poll_leaves(&mut self) {
        let events = &mut self.events;
        self.leaves.retain(|reply| match reply.poll() {
            None => true,
            Some(Ok(())) => {
                debug!("Leave acknowledged");
                false
            }
            Some(Err(error)) => {
                warn!("Leave failed remotely, already left locally: {}", error);
                events.push_back(LobbyEvent::RequestFailed {
                    request: Request::LeaveSession,
                    error,
                });
                false
            }
        });
    }

    fn poll_pushes(&mut self) {
        loop {
            let next = match &self.membership {
                Some(membership) => membership.pushes.try_recv(),
                None => return,
            };
            match next {
                Ok(Push::Session(push)) => self.on_push(push),
                Ok(other) => debug!("Ignoring {:?} on a session channel", other),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.on_push(SessionPush::Disconnected);
                    return;
                }
            }
        }
    }
}
