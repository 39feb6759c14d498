use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod gateway;
pub mod structs;
pub mod subscription;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayErrorKind {
    Network,
    NotFound,
    Conflict,
    Forbidden,
    /// The reply broke an invariant of the data model
    Malformed,
}

/// A failed remote call. `message` is user-facing and is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::NotFound, message)
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GatewayError {}

pub type GatewayResult<T> = ::std::result::Result<T, GatewayError>;

/// Handed to a gateway together with a request. The gateway answers exactly once,
/// now or on a later tick.
pub struct Responder<T> {
    tx: Sender<GatewayResult<T>>,
}

impl<T> Responder<T> {
    pub fn respond(self, result: GatewayResult<T>) {
        if self.tx.send(result).is_err() {
            debug!("Requester is gone, dropping gateway reply");
        }
    }
}

/// Requester side of a pending gateway call.
pub struct Reply<T> {
    rx: Receiver<GatewayResult<T>>,
}

impl<T> Reply<T> {
    /// `None` while the gateway has not answered yet. A gateway dropping the responder
    /// without answering resolves to a network error.
    pub fn poll(&self) -> Option<GatewayResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(GatewayError::network(
                "The request was dropped before completing",
            ))),
        }
    }
}

pub fn reply_channel<T>() -> (Responder<T>, Reply<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (Responder { tx }, Reply { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_pending_until_answered() {
        let (responder, reply) = reply_channel::<u8>();
        assert!(reply.poll().is_none());
        responder.respond(Ok(3));
        assert_eq!(reply.poll(), Some(Ok(3)));
    }

    #[test]
    fn dropped_responder_resolves_to_network_error() {
        let (responder, reply) = reply_channel::<()>();
        drop(responder);
        let err = reply.poll().unwrap().unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Network);
    }

    #[test]
    fn answering_a_dropped_requester_is_harmless() {
        let (responder, reply) = reply_channel::<()>();
        drop(reply);
        responder.respond(Err(GatewayError::not_found("Room not found")));
    }
}
