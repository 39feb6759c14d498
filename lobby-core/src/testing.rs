use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::remote::gateway::{RemoteSessionGateway, SocialGateway};
use crate::remote::structs::{
    CreateRoomRequest, FriendRequest, GameInvite, GameType, JoinRoomRequest, RosterSnapshot,
    Session, SessionStatus,
};
use crate::remote::subscription::{EventSubscription, Push, PushSink, SubscriptionHandle, Topic};
use crate::remote::{GatewayError, GatewayResult, Responder};

/// Records calls and answers them from a script. Answers are delivered right away unless
/// replies are held.
pub(crate) struct FakeGateway {
    calls: RefCell<Vec<String>>,
    failures: RefCell<HashMap<&'static str, VecDeque<GatewayError>>>,
    active_game: Cell<bool>,
    roster: RefCell<RosterSnapshot>,
    hold: Cell<bool>,
    held: RefCell<Vec<Box<dyn FnOnce()>>>,
    rooms: Cell<usize>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(HashMap::new()),
            active_game: Cell::new(false),
            roster: RefCell::new(RosterSnapshot::default()),
            hold: Cell::new(false),
            held: RefCell::new(Vec::new()),
            rooms: Cell::new(0),
        }
    }

    pub fn fail_next(&self, op: &'static str, error: GatewayError) {
        self.failures
            .borrow_mut()
            .entry(op)
            .or_insert_with(VecDeque::new)
            .push_back(error);
    }

    pub fn set_active_game(&self, active: bool) {
        self.active_game.set(active);
    }

    pub fn set_roster(&self, roster: RosterSnapshot) {
        *self.roster.borrow_mut() = roster;
    }

    pub fn hold_replies(&self, hold: bool) {
        self.hold.set(hold);
    }

    /// Deliver every held reply, returns how many there were.
    pub fn release_held(&self) -> usize {
        let held: Vec<_> = self.held.borrow_mut().drain(..).collect();
        let count = held.len();
        for deliver in held {
            deliver();
        }
        count
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.borrow().iter().any(|c| c == call)
    }

    pub fn called_prefix(&self, prefix: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.starts_with(prefix))
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn outcome<T>(&self, op: &'static str, value: T) -> GatewayResult<T> {
        match self
            .failures
            .borrow_mut()
            .get_mut(op)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }

    fn answer<T: 'static>(&self, responder: Responder<T>, result: GatewayResult<T>) {
        if self.hold.get() {
            self.held
                .borrow_mut()
                .push(Box::new(move || responder.respond(result)));
        } else {
            responder.respond(result);
        }
    }

    fn next_room_id(&self) -> String {
        self.rooms.set(self.rooms.get() + 1);
        format!("room-{}", self.rooms.get())
    }
}

pub(crate) fn session(id: &str, game_type: GameType, max_players: u8, code: Option<&str>) -> Session {
    Session {
        id: id.to_owned(),
        name: format!("{} lobby", id),
        game_type,
        status: SessionStatus::Waiting,
        players: Default::default(),
        max_players,
        access_code: code.map(str::to_owned),
        is_private: code.is_some(),
    }
}

pub(crate) fn invite(id: &str, code: Option<&str>, game_type: GameType) -> GameInvite {
    GameInvite {
        id: id.to_owned(),
        sender_username: "alice".to_owned(),
        lobby_name: format!("{}'s lobby", id),
        game_type,
        access_code: code.map(str::to_owned),
    }
}

pub(crate) fn friend_request(id: &str) -> FriendRequest {
    FriendRequest {
        id: id.to_owned(),
        requester_id: format!("user-{}", id),
        requester_username: format!("requester {}", id),
        created_at: 1_600_000_000_000,
    }
}

impl RemoteSessionGateway for FakeGateway {
    fn create_room(&self, request: CreateRoomRequest, responder: Responder<Session>) {
        self.record("create_room".to_owned());
        let code = if request.is_private { Some("ABCD") } else { None };
        let mut room = session(
            &self.next_room_id(),
            request.game_type,
            request.capacity,
            code,
        );
        room.name = request.name;
        let result = self.outcome("create_room", room);
        self.answer(responder, result);
    }

    fn join_room(&self, request: JoinRoomRequest, responder: Responder<Session>) {
        self.record(format!(
            "join_room:{}:{}",
            request.code.as_deref().unwrap_or("random"),
            request.game_type
        ));
        let room = session(
            &self.next_room_id(),
            request.game_type,
            4,
            request.code.as_deref(),
        );
        let result = self.outcome("join_room", room);
        self.answer(responder, result);
    }

    fn leave_room(&self, responder: Responder<()>) {
        self.record("leave_room".to_owned());
        let result = self.outcome("leave_room", ());
        self.answer(responder, result);
    }

    fn check_active_game(&self, responder: Responder<bool>) {
        self.record("check_active_game".to_owned());
        let result = self.outcome("check_active_game", self.active_game.get());
        self.answer(responder, result);
    }

    fn leave_game(&self, responder: Responder<()>) {
        self.record("leave_game".to_owned());
        let result = self.outcome("leave_game", ());
        self.answer(responder, result);
    }
}

impl SocialGateway for FakeGateway {
    fn fetch_roster(&self, responder: Responder<RosterSnapshot>) {
        self.record("fetch_roster".to_owned());
        let result = self.outcome("fetch_roster", self.roster.borrow().clone());
        self.answer(responder, result);
    }

    fn accept_friend_request(&self, request_id: &str, responder: Responder<()>) {
        self.record(format!("accept_friend_request:{}", request_id));
        let result = self.outcome("accept_friend_request", ());
        self.answer(responder, result);
    }

    fn reject_friend_request(&self, request_id: &str, responder: Responder<()>) {
        self.record(format!("reject_friend_request:{}", request_id));
        let result = self.outcome("reject_friend_request", ());
        self.answer(responder, result);
    }

    fn remove_friend(&self, friend_id: &str, responder: Responder<()>) {
        self.record(format!("remove_friend:{}", friend_id));
        let result = self.outcome("remove_friend", ());
        self.answer(responder, result);
    }

    fn accept_game_invite(&self, invite_id: &str, responder: Responder<()>) {
        self.record(format!("accept_game_invite:{}", invite_id));
        let result = self.outcome("accept_game_invite", ());
        self.answer(responder, result);
    }

    fn decline_game_invite(&self, invite_id: &str, responder: Responder<()>) {
        self.record(format!("decline_game_invite:{}", invite_id));
        let result = self.outcome("decline_game_invite", ());
        self.answer(responder, result);
    }
}

/// Keeps the sinks handed to it so tests can push to them.
pub(crate) struct FakeSubscriptions {
    sinks: Rc<RefCell<Vec<PushSink>>>,
}

impl FakeSubscriptions {
    pub fn new() -> Self {
        Self {
            sinks: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.sinks.borrow().iter().any(|sink| sink.topic() == topic)
    }

    /// Deliver to every subscriber of `topic`, returns how many got it.
    pub fn push(&self, topic: &Topic, push: Push) -> usize {
        self.sinks
            .borrow()
            .iter()
            .filter(|sink| sink.topic() == topic)
            .filter(|sink| sink.deliver(push.clone()))
            .count()
    }

    /// Drop the sinks of `topic` the way a broken transport would.
    pub fn disconnect(&self, topic: &Topic) {
        self.sinks.borrow_mut().retain(|sink| sink.topic() != topic);
    }
}

impl EventSubscription for FakeSubscriptions {
    fn subscribe(&self, topic: Topic, sink: PushSink) -> SubscriptionHandle {
        self.sinks.borrow_mut().push(sink);
        let sinks = Rc::downgrade(&self.sinks);
        let subscribed = topic.clone();
        SubscriptionHandle::new(topic, move || {
            if let Some(sinks) = sinks.upgrade() {
                sinks.borrow_mut().retain(|sink| sink.topic() != &subscribed);
            }
        })
    }
}
