//! In-process stand-in for the lobby server, so the client can be driven without a network.
//!
//! Replies are held back until the next [`LoopbackServer::advance`], pushes travel encoded
//! like they would on a real transport.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::{Rc, Weak};

use lobby_core::remote::gateway::{RemoteSessionGateway, SocialGateway};
use lobby_core::remote::structs::{
    CreateRoomRequest, Friend, FriendRequest, FriendStatus, GameInvite, GameType,
    JoinRoomRequest, PlayerInfo, RosterSnapshot, Session, SessionSnapshot, SessionStatus,
};
use lobby_core::remote::subscription::{
    EventSubscription, Push, PushSink, RosterPush, SessionPush, SubscriptionHandle, Topic,
};
use lobby_core::remote::{GatewayError, GatewayErrorKind, GatewayResult, Responder};
use lobby_core::utils::time::unix_millis;
use log::{debug, error, info};

use crate::config::LoopbackConfig;

struct Room {
    session: Session,
    version: u64,
    ticks: u32,
}

struct World {
    user_id: String,
    username: String,
    room: Option<Room>,
    /// Private lobbies waiting for players, by access code
    lobbies: HashMap<String, Session>,
    unfinished_game: bool,
    roster: RosterSnapshot,
    sinks: Vec<(u64, PushSink)>,
    next_sink: u64,
    next_room: u32,
    next_bot: u32,
    outgoing: Vec<(Topic, Push)>,
}

impl World {
    fn new(username: &str, config: &LoopbackConfig) -> Self {
        let mut world = Self {
            user_id: format!("u-{}", username),
            username: username.to_owned(),
            room: None,
            lobbies: HashMap::new(),
            unfinished_game: config.start_with_unfinished_game,
            roster: RosterSnapshot::default(),
            sinks: Vec::new(),
            next_sink: 0,
            next_room: 0,
            next_bot: 0,
            outgoing: Vec::new(),
        };
        world.seed();
        world
    }

    fn seed(&mut self) {
        let friends = [
            ("f-1", "kasia", FriendStatus::Online),
            ("f-2", "tomek", FriendStatus::Playing),
            ("f-3", "ola", FriendStatus::Offline),
        ];
        self.roster.friends = friends
            .iter()
            .map(|&(id, username, status)| Friend {
                id: id.to_owned(),
                username: username.to_owned(),
                status,
            })
            .collect();
        self.roster.pending_requests.push(FriendRequest {
            id: "r-1".to_owned(),
            requester_id: "u-marek".to_owned(),
            requester_username: "marek".to_owned(),
            created_at: unix_millis().saturating_sub(60_000),
        });

        let mut night = self.new_session("Makao Night", GameType::Makao, 4, true);
        night.players.insert(
            "u-kasia".to_owned(),
            PlayerInfo {
                username: "kasia".to_owned(),
                is_online: true,
            },
        );
        self.roster.invites.push(GameInvite {
            id: "i-1".to_owned(),
            sender_username: "kasia".to_owned(),
            lobby_name: night.name.clone(),
            game_type: GameType::Makao,
            access_code: night.access_code.clone(),
        });
        if let Some(code) = night.access_code.clone() {
            self.lobbies.insert(code, night);
        }
        // Points at a lobby that closed already
        self.roster.invites.push(GameInvite {
            id: "i-2".to_owned(),
            sender_username: "tomek".to_owned(),
            lobby_name: "Ludo Classic".to_owned(),
            game_type: GameType::Ludo,
            access_code: Some("GONE".to_owned()),
        });
    }

    fn new_session(&mut self, name: &str, game_type: GameType, capacity: u8, is_private: bool) -> Session {
        self.next_room += 1;
        Session {
            id: format!("room-{}", self.next_room),
            name: name.to_owned(),
            game_type,
            status: SessionStatus::Waiting,
            players: BTreeMap::new(),
            max_players: capacity,
            access_code: if is_private {
                Some(format!("R{:03}", self.next_room))
            } else {
                None
            },
            is_private,
        }
    }

    fn me(&self) -> (String, PlayerInfo) {
        (
            self.user_id.clone(),
            PlayerInfo {
                username: self.username.clone(),
                is_online: true,
            },
        )
    }

    fn add_bot(session: &mut Session, bot: u32) {
        session.players.insert(
            format!("bot-{}", bot),
            PlayerInfo {
                username: format!("Bot {}", bot),
                is_online: true,
            },
        );
    }

    fn enter(&mut self, mut session: Session) -> Session {
        let (id, info) = self.me();
        session.players.insert(id, info);
        if session.is_full() {
            session.status = SessionStatus::Playing;
        }
        self.room = Some(Room {
            session: session.clone(),
            version: 0,
            ticks: 0,
        });
        session
    }

    fn create(&mut self, request: CreateRoomRequest) -> GatewayResult<Session> {
        if self.room.is_some() {
            return Err(GatewayError::new(
                GatewayErrorKind::Conflict,
                "You are already in a lobby",
            ));
        }
        let session = self.new_session(
            &request.name,
            request.game_type,
            request.capacity,
            request.is_private,
        );
        info!("Loopback created {} ({})", session.name, session.id);
        Ok(self.enter(session))
    }

    fn join(&mut self, request: JoinRoomRequest) -> GatewayResult<Session> {
        if self.room.is_some() {
            return Err(GatewayError::new(
                GatewayErrorKind::Conflict,
                "You are already in a lobby",
            ));
        }
        let session = match request.code {
            Some(code) => {
                let session = self
                    .lobbies
                    .remove(&code)
                    .ok_or_else(|| GatewayError::not_found("Lobby not found"))?;
                if session.game_type != request.game_type {
                    let message = format!("That lobby plays {}", session.game_type);
                    self.lobbies.insert(code, session);
                    return Err(GatewayError::new(GatewayErrorKind::Conflict, message));
                }
                session
            }
            None => {
                let name = format!("Open {} table", request.game_type);
                let mut session = self.new_session(&name, request.game_type, 4, false);
                self.next_bot += 1;
                Self::add_bot(&mut session, self.next_bot);
                session
            }
        };
        Ok(self.enter(session))
    }

    fn leave_room(&mut self) -> GatewayResult<()> {
        match self.room.take() {
            Some(room) => {
                info!("Loopback: player left {}", room.session.id);
                Ok(())
            }
            None => Err(GatewayError::not_found("You are not in a lobby")),
        }
    }

    fn leave_game(&mut self) -> GatewayResult<()> {
        let in_game = self
            .room
            .as_ref()
            .map_or(false, |room| room.session.status == SessionStatus::Playing);
        if !in_game && !self.unfinished_game {
            return Err(GatewayError::not_found("No game to leave"));
        }
        if in_game {
            self.room = None;
        }
        self.unfinished_game = false;
        Ok(())
    }

    fn resolve_request(&mut self, request_id: &str, accept: bool) -> GatewayResult<()> {
        let index = self
            .roster
            .pending_requests
            .iter()
            .position(|r| r.id == request_id)
            .ok_or_else(|| GatewayError::not_found("Friend request not found"))?;
        let request = self.roster.pending_requests.remove(index);
        if accept {
            let friend = Friend {
                id: format!("f-{}", request.requester_id),
                username: request.requester_username,
                status: FriendStatus::Online,
            };
            self.roster.friends.push(friend.clone());
            self.outgoing
                .push((Topic::Roster, Push::Roster(RosterPush::FriendUpdated(friend))));
        }
        Ok(())
    }

    fn remove_friend(&mut self, friend_id: &str) -> GatewayResult<()> {
        let before = self.roster.friends.len();
        self.roster.friends.retain(|f| f.id != friend_id);
        if self.roster.friends.len() == before {
            return Err(GatewayError::not_found("Friend not found"));
        }
        Ok(())
    }

    fn drop_invite(&mut self, invite_id: &str) -> GatewayResult<()> {
        let before = self.roster.invites.len();
        self.roster.invites.retain(|i| i.id != invite_id);
        if self.roster.invites.len() == before {
            return Err(GatewayError::not_found("Invite not found"));
        }
        Ok(())
    }

    /// A fresh subscriber to the current room gets its latest state right away.
    fn greet(&mut self, topic: &Topic) {
        if let Some(room) = &self.room {
            if *topic == Topic::Session(room.session.id.clone()) {
                self.outgoing.push((
                    topic.clone(),
                    Push::Session(SessionPush::Snapshot(SessionSnapshot {
                        version: room.version,
                        session: room.session.clone(),
                    })),
                ));
            }
        }
    }

    fn simulate(&mut self, config: &LoopbackConfig) -> Vec<(Topic, Push)> {
        let mut pushes: Vec<_> = self.outgoing.drain(..).collect();
        let mut next_bot = self.next_bot;
        let mut ended = false;
        if let Some(room) = self.room.as_mut() {
            room.ticks += 1;
            let changed = match room.session.status {
                SessionStatus::Waiting if room.ticks >= config.bot_join_ticks => {
                    room.ticks = 0;
                    if !room.session.is_full() {
                        next_bot += 1;
                        Self::add_bot(&mut room.session, next_bot);
                    }
                    if room.session.is_full() {
                        room.session.status = SessionStatus::Playing;
                    }
                    true
                }
                SessionStatus::Playing if room.ticks >= config.game_ticks => {
                    room.session.status = SessionStatus::Ended;
                    ended = true;
                    true
                }
                _ => false,
            };
            if changed {
                room.version += 1;
                debug!(
                    "Loopback: {} v{} is {:?}",
                    room.session.id, room.version, room.session.status
                );
                pushes.push((
                    Topic::Session(room.session.id.clone()),
                    Push::Session(SessionPush::Snapshot(SessionSnapshot {
                        version: room.version,
                        session: room.session.clone(),
                    })),
                ));
            }
        }
        self.next_bot = next_bot;
        if ended {
            self.room = None;
        }
        pushes
    }
}

pub struct LoopbackServer {
    config: LoopbackConfig,
    world: Rc<RefCell<World>>,
    outbox: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

impl LoopbackServer {
    pub fn new(username: &str, config: LoopbackConfig) -> Self {
        Self {
            world: Rc::new(RefCell::new(World::new(username, &config))),
            config,
            outbox: RefCell::new(VecDeque::new()),
        }
    }

    /// Deliver the replies of the previous tick, then move the simulated lobby forward.
    pub fn advance(&self) {
        let due: Vec<_> = self.outbox.borrow_mut().drain(..).collect();
        for deliver in due {
            deliver();
        }
        let pushes = self.world.borrow_mut().simulate(&self.config);
        for (topic, push) in pushes {
            self.broadcast(&topic, &push);
        }
    }

    fn broadcast(&self, topic: &Topic, push: &Push) {
        let buffer = match push.encode() {
            Ok(buffer) => buffer,
            Err(err) => {
                error!("Loopback could not encode push for {}: {}", topic, err);
                return;
            }
        };
        let sinks: Vec<PushSink> = self
            .world
            .borrow()
            .sinks
            .iter()
            .filter(|(_, sink)| sink.topic() == topic)
            .map(|(_, sink)| sink.clone())
            .collect();
        for sink in sinks {
            sink.deliver_encoded(&buffer);
        }
    }

    fn later<T: 'static>(&self, responder: Responder<T>, result: GatewayResult<T>) {
        self.outbox
            .borrow_mut()
            .push_back(Box::new(move || responder.respond(result)));
    }
}

impl RemoteSessionGateway for LoopbackServer {
    fn create_room(&self, request: CreateRoomRequest, responder: Responder<Session>) {
        let result = self.world.borrow_mut().create(request);
        self.later(responder, result);
    }

    fn join_room(&self, request: JoinRoomRequest, responder: Responder<Session>) {
        let result = self.world.borrow_mut().join(request);
        self.later(responder, result);
    }

    fn leave_room(&self, responder: Responder<()>) {
        let result = self.world.borrow_mut().leave_room();
        self.later(responder, result);
    }

    fn check_active_game(&self, responder: Responder<bool>) {
        let active = self.world.borrow().unfinished_game;
        self.later(responder, Ok(active));
    }

    fn leave_game(&self, responder: Responder<()>) {
        let result = self.world.borrow_mut().leave_game();
        self.later(responder, result);
    }
}

impl SocialGateway for LoopbackServer {
    fn fetch_roster(&self, responder: Responder<RosterSnapshot>) {
        let roster = self.world.borrow().roster.clone();
        self.later(responder, Ok(roster));
    }

    fn accept_friend_request(&self, request_id: &str, responder: Responder<()>) {
        let result = self.world.borrow_mut().resolve_request(request_id, true);
        self.later(responder, result);
    }

    fn reject_friend_request(&self, request_id: &str, responder: Responder<()>) {
        let result = self.world.borrow_mut().resolve_request(request_id, false);
        self.later(responder, result);
    }

    fn remove_friend(&self, friend_id: &str, responder: Responder<()>) {
        let result = self.world.borrow_mut().remove_friend(friend_id);
        self.later(responder, result);
    }

    fn accept_game_invite(&self, invite_id: &str, responder: Responder<()>) {
        let result = self.world.borrow_mut().drop_invite(invite_id);
        self.later(responder, result);
    }

    fn decline_game_invite(&self, invite_id: &str, responder: Responder<()>) {
        let result = self.world.borrow_mut().drop_invite(invite_id);
        self.later(responder, result);
    }
}

impl EventSubscription for LoopbackServer {
    fn subscribe(&self, topic: Topic, sink: PushSink) -> SubscriptionHandle {
        let id = {
            let mut world = self.world.borrow_mut();
            world.next_sink += 1;
            let id = world.next_sink;
            world.sinks.push((id, sink));
            world.greet(&topic);
            id
        };
        debug!("Loopback: subscriber {} on {}", id, topic);
        let world: Weak<RefCell<World>> = Rc::downgrade(&self.world);
        SubscriptionHandle::new(topic, move || {
            if let Some(world) = world.upgrade() {
                world.borrow_mut().sinks.retain(|(sink_id, _)| *sink_id != id);
            }
        })
    }
}
