use crate::remote::structs::{Friend, FriendRequest, GameInvite, RosterSnapshot, SessionSnapshot};
use crate::{ErrorKind, Result};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Session(String),
    Roster,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Session(id) => write!(f, "session/{}", id),
            Topic::Roster => f.write_str("roster"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionPush {
    Snapshot(SessionSnapshot),
    /// The server no longer knows the session
    NotFound { session_id: String },
    /// Transport lost; the session itself may still be alive
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RosterPush {
    Synced(RosterSnapshot),
    FriendRequestReceived(FriendRequest),
    FriendRequestWithdrawn { request_id: String },
    GameInviteReceived(GameInvite),
    GameInviteRevoked { invite_id: String },
    FriendUpdated(Friend),
    FriendRemoved { friend_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Push {
    Session(SessionPush),
    Roster(RosterPush),
}

impl Push {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|err| {
            Box::new(ErrorKind::Codec(format!(
                "Could not serialize push: {:?}",
                err
            )))
        })
    }

    pub fn decode(buffer: &[u8]) -> Result<Push> {
        bincode::deserialize(buffer).map_err(|err| {
            Box::new(ErrorKind::Codec(format!(
                "Could not deserialize push: {:?}",
                err
            )))
        })
    }
}

/// Where a subscription delivers pushes for its topic.
#[derive(Clone)]
pub struct PushSink {
    topic: Topic,
    tx: Sender<Push>,
}

impl PushSink {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Returns false once the subscriber is gone.
    pub fn deliver(&self, push: Push) -> bool {
        if self.tx.send(push).is_err() {
            debug!("Subscriber of {} is gone, dropping push", self.topic);
            return false;
        }
        true
    }

    /// Deliver a push received as bytes. Undecodable buffers are logged and skipped.
    pub fn deliver_encoded(&self, buffer: &[u8]) -> bool {
        match Push::decode(buffer) {
            Ok(push) => self.deliver(push),
            Err(err) => {
                error!("Dropping push for {}: {}", self.topic, err);
                true
            }
        }
    }
}

pub fn push_channel(topic: Topic) -> (PushSink, Receiver<Push>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (PushSink { topic, tx }, rx)
}

/// Keeps a subscription alive. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    topic: Topic,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl SubscriptionHandle {
    pub fn new(topic: Topic, cancel: impl FnOnce() + 'static) -> Self {
        Self {
            topic,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            debug!("Unsubscribing from {}", self.topic);
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Push-update channel keyed by topic.
pub trait EventSubscription {
    fn subscribe(&self, topic: Topic, sink: PushSink) -> SubscriptionHandle;
}
