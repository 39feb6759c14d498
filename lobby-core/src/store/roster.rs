use std::collections::vec_deque::Drain;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, error, info, warn};

use crate::remote::gateway::SocialGateway;
use crate::remote::structs::{Friend, FriendRequest, GameInvite, InviteHandoff, RosterSnapshot};
use crate::remote::subscription::{
    push_channel, EventSubscription, Push, RosterPush, SubscriptionHandle, Topic,
};
use crate::remote::{reply_channel, Reply, Responder};
use crate::{ErrorKind, LobbyEvent, Request, Result};

/// Entries an action can be pending on. Accepting and rejecting the same request share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntryKey {
    FriendRequest(String),
    Friend(String),
}

struct InFlight {
    request: Request,
    reply: Reply<()>,
}

/// Friends, pending friend requests and game invites of the logged-in player.
pub struct SocialRosterStore {
    gateway: Rc<dyn SocialGateway>,
    friends: Vec<Friend>,
    pending_requests: Vec<FriendRequest>,
    invites: Vec<GameInvite>,
    in_flight: HashMap<EntryKey, InFlight>,
    // Invite accepts and declines, already applied locally
    notices: Vec<(Request, Reply<()>)>,
    // Settled locally, a sync answered before the server caught up must not bring them back
    consumed_invites: HashSet<String>,
    resolved_requests: HashSet<String>,
    removed_friends: HashSet<String>,
    sync: Option<Reply<RosterSnapshot>>,
    subscription: SubscriptionHandle,
    pushes: Receiver<Push>,
    connected: bool,
    events: VecDeque<LobbyEvent>,
}

impl SocialRosterStore {
    pub fn new(gateway: Rc<dyn SocialGateway>, subscriptions: &dyn EventSubscription) -> Self {
        let (sink, pushes) = push_channel(Topic::Roster);
        let subscription = subscriptions.subscribe(Topic::Roster, sink);
        Self {
            gateway,
            friends: Vec::new(),
            pending_requests: Vec::new(),
            invites: Vec::new(),
            in_flight: HashMap::new(),
            notices: Vec::new(),
            consumed_invites: HashSet::new(),
            resolved_requests: HashSet::new(),
            removed_friends: HashSet::new(),
            sync: None,
            subscription,
            pushes,
            connected: true,
            events: VecDeque::new(),
        }
    }

    pub fn friends(&self) -> &[Friend] {
        &self.friends
    }

    pub fn pending_requests(&self) -> &[FriendRequest] {
        &self.pending_requests
    }

    pub fn invites(&self) -> &[GameInvite] {
        &self.invites
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.in_flight.contains_key(&EntryKey::FriendRequest(id.to_owned()))
            || self.in_flight.contains_key(&EntryKey::Friend(id.to_owned()))
    }

    /// Reload all three lists from the server.
    pub fn sync(&mut self) {
        if self.sync.is_some() {
            debug!("Roster sync already pending");
            return;
        }
        let (responder, reply) = reply_channel();
        self.gateway.fetch_roster(responder);
        self.sync = Some(reply);
    }

    pub fn accept_friend_request(&mut self, request_id: &str) -> Result<()> {
        self.begin_request_action(
            request_id,
            Request::AcceptFriendRequest(request_id.to_owned()),
            |gateway, responder| gateway.accept_friend_request(request_id, responder),
        )
    }

    pub fn reject_friend_request(&mut self, request_id: &str) -> Result<()> {
        self.begin_request_action(
            request_id,
            Request::RejectFriendRequest(request_id.to_owned()),
            |gateway, responder| gateway.reject_friend_request(request_id, responder),
        )
    }

    /// Confirmation is the caller's job, this removes straight away.
    pub fn remove_friend(&mut self, friend_id: &str) -> Result<()> {
        let key = EntryKey::Friend(friend_id.to_owned());
        let request = Request::RemoveFriend(friend_id.to_owned());
        self.ensure_idle(&key, &request)?;
        if !self.friends.iter().any(|f| f.id == friend_id) {
            return Err(Box::new(ErrorKind::StaleState(format!(
                "Unknown friend {}",
                friend_id
            ))));
        }
        let (responder, reply) = reply_channel();
        self.gateway.remove_friend(friend_id, responder);
        self.in_flight.insert(key, InFlight { request, reply });
        Ok(())
    }

    /// Consume the invite and hand its lobby details to the caller. The invite is gone
    /// for good, whatever happens to the join that follows.
    pub fn accept_game_invite(&mut self, invite_id: &str) -> Result<InviteHandoff> {
        let invite = self.take_invite(invite_id)?;
        info!(
            "Accepted invite {} from {} to {}",
            invite.id, invite.sender_username, invite.lobby_name
        );
        let (responder, reply) = reply_channel();
        self.gateway.accept_game_invite(invite_id, responder);
        self.notices
            .push((Request::AcceptGameInvite(invite_id.to_owned()), reply));
        Ok(invite.into())
    }

    pub fn decline_game_invite(&mut self, invite_id: &str) -> Result<()> {
        let invite = self.take_invite(invite_id)?;
        info!("Declined invite {} from {}", invite.id, invite.sender_username);
        let (responder, reply) = reply_channel();
        self.gateway.decline_game_invite(invite_id, responder);
        self.notices
            .push((Request::DeclineGameInvite(invite_id.to_owned()), reply));
        Ok(())
    }

    pub fn on_push(&mut self, push: RosterPush) {
        match push {
            RosterPush::Synced(snapshot) => self.replace(snapshot),
            RosterPush::FriendRequestReceived(request) => {
                upsert(&mut self.pending_requests, request.clone(), |r| &r.id);
                self.events
                    .push_back(LobbyEvent::FriendRequestReceived { request });
            }
            RosterPush::FriendRequestWithdrawn { request_id } => {
                self.pending_requests.retain(|r| r.id != request_id);
            }
            RosterPush::GameInviteReceived(invite) => {
                if self.consumed_invites.contains(&invite.id) {
                    debug!("Ignoring invite {}, already used", invite.id);
                    return;
                }
                upsert(&mut self.invites, invite.clone(), |i| &i.id);
                self.events.push_back(LobbyEvent::GameInviteReceived { invite });
            }
            RosterPush::GameInviteRevoked { invite_id } => {
                self.invites.retain(|i| i.id != invite_id);
            }
            RosterPush::FriendUpdated(friend) => {
                self.removed_friends.remove(&friend.id);
                upsert(&mut self.friends, friend.clone(), |f| &f.id);
                self.events.push_back(LobbyEvent::FriendUpdated { friend });
            }
            RosterPush::FriendRemoved { friend_id } => {
                let before = self.friends.len();
                self.friends.retain(|f| f.id != friend_id);
                if self.friends.len() != before {
                    self.events.push_back(LobbyEvent::FriendRemoved { friend_id });
                }
            }
        }
    }

    pub fn tick(&mut self) {
        self.poll_sync();
        self.poll_in_flight();
        self.poll_notices();
        self.poll_pushes();
    }

    pub fn poll_events(&mut self, events: &mut Vec<LobbyEvent>) {
        crate::store::fill_events(&mut self.events, events);
    }

    pub(crate) fn drain_events(&mut self) -> Drain<'_, LobbyEvent> {
        self.events.drain(..)
    }

    fn ensure_idle(&self, key: &EntryKey, request: &Request) -> Result<()> {
        if self.in_flight.contains_key(key) {
            return Err(Box::new(ErrorKind::AlreadyInProgress(request.to_string())));
        }
        Ok(())
    }

    fn begin_request_action(
        &mut self,
        request_id: &str,
        request: Request,
        call: impl FnOnce(&dyn SocialGateway, Responder<()>),
    ) -> Result<()> {
        let key = EntryKey::FriendRequest(request_id.to_owned());
        self.ensure_idle(&key, &request)?;
        if !self.pending_requests.iter().any(|r| r.id == request_id) {
            return Err(Box::new(ErrorKind::StaleState(format!(
                "Unknown friend request {}",
                request_id
            ))));
        }
        let (responder, reply) = reply_channel();
        call(self.gateway.as_ref(), responder);
        self.in_flight.insert(key, InFlight { request, reply });
        Ok(())
    }

    fn take_invite(&mut self, invite_id: &str) -> Result<GameInvite> {
        match self.invites.iter().position(|i| i.id == invite_id) {
            Some(index) => {
                self.consumed_invites.insert(invite_id.to_owned());
                Ok(self.invites.remove(index))
            }
            None => Err(Box::new(ErrorKind::StaleState(format!(
                "Unknown invite {}",
                invite_id
            )))),
        }
    }

    fn replace(&mut self, mut snapshot: RosterSnapshot) {
        let removed = &self.removed_friends;
        snapshot.friends.retain(|f| !removed.contains(&f.id));
        let resolved = &self.resolved_requests;
        snapshot.pending_requests.retain(|r| !resolved.contains(&r.id));
        let consumed = &self.consumed_invites;
        snapshot.invites.retain(|i| !consumed.contains(&i.id));
        debug!(
            "Roster synced: {} friends, {} requests, {} invites",
            snapshot.friends.len(),
            snapshot.pending_requests.len(),
            snapshot.invites.len()
        );
        self.friends = snapshot.friends;
        self.pending_requests = snapshot.pending_requests;
        self.invites = snapshot.invites;
        self.events.push_back(LobbyEvent::RosterSynced);
    }

    fn poll_sync(&mut self) {
        if let Some(result) = self.sync.as_ref().and_then(Reply::poll) {
            self.sync = None;
            match result {
                Ok(snapshot) => self.replace(snapshot),
                Err(error) => {
                    error!("{} failed: {}", Request::SyncRoster, error);
                    self.events.push_back(LobbyEvent::RequestFailed {
                        request: Request::SyncRoster,
                        error,
                    });
                }
            }
        }
    }

    fn poll_in_flight(&mut self) {
        let done: Vec<_> = self
            .in_flight
            .iter()
            .filter_map(|(key, in_flight)| in_flight.reply.poll().map(|r| (key.clone(), r)))
            .collect();
        for (key, result) in done {
            let request = match self.in_flight.remove(&key) {
                Some(in_flight) => in_flight.request,
                None => continue,
            };
            match result {
                Ok(()) => self.complete(request),
                Err(error) => {
                    error!("{} failed: {}", request, error);
                    self.events
                        .push_back(LobbyEvent::RequestFailed { request, error });
                }
            }
        }
    }

    fn complete(&mut self, request: Request) {
        match request {
            Request::AcceptFriendRequest(request_id) => {
                self.pending_requests.retain(|r| r.id != request_id);
                self.resolved_requests.insert(request_id.clone());
                self.events
                    .push_back(LobbyEvent::FriendRequestAccepted { request_id });
            }
            Request::RejectFriendRequest(request_id) => {
                self.pending_requests.retain(|r| r.id != request_id);
                self.resolved_requests.insert(request_id.clone());
                self.events
                    .push_back(LobbyEvent::FriendRequestRejected { request_id });
            }
            Request::RemoveFriend(friend_id) => {
                self.friends.retain(|f| f.id != friend_id);
                self.removed_friends.insert(friend_id.clone());
                self.events.push_back(LobbyEvent::FriendRemoved { friend_id });
            }
            other => debug!("Nothing to apply for {:?}", other),
        }
    }

    fn poll_notices(&mut self) {
        self.notices.retain(|(request, reply)| match reply.poll() {
            None => true,
            Some(Ok(())) => false,
            Some(Err(err)) => {
                warn!("{} was not acknowledged: {}", request, err);
                false
            }
        });
    }

    fn poll_pushes(&mut self) {
        loop {
            match self.pushes.try_recv() {
                Ok(Push::Roster(push)) => self.on_push(push),
                Ok(other) => debug!("Ignoring {:?} on the roster channel", other),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    if self.connected {
                        warn!("Lost roster updates");
                        self.connected = false;
                        self.events.push_back(LobbyEvent::SubscriptionLost {
                            topic: self.subscription.topic().clone(),
                        });
                    }
                    return;
                }
            }
        }
    }
}

fn upsert<T>(entries: &mut Vec<T>, entry: T, id: impl Fn(&T) -> &String) {
    match entries.iter().position(|e| id(e) == id(&entry)) {
        Some(index) => entries[index] = entry,
        None => entries.push(entry),
    }
}
