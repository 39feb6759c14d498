use crate::LobbyEvent;
use std::collections::VecDeque;

pub mod roster;
pub mod session;

/// Move queued events into `events`, up to its capacity.
pub(crate) fn fill_events(queue: &mut VecDeque<LobbyEvent>, events: &mut Vec<LobbyEvent>) {
    events.clear();
    let count = queue.len().min(events.capacity());
    events.extend(queue.drain(..count));
}
