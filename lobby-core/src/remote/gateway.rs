use crate::remote::structs::{CreateRoomRequest, JoinRoomRequest, RosterSnapshot, Session};
use crate::remote::Responder;

/// Network boundary for room membership. Every call returns immediately and answers
/// through its responder.
pub trait RemoteSessionGateway {
    fn create_room(&self, request: CreateRoomRequest, responder: Responder<Session>);
    fn join_room(&self, request: JoinRoomRequest, responder: Responder<Session>);
    fn leave_room(&self, responder: Responder<()>);
    /// Whether the player still has an unfinished game somewhere.
    fn check_active_game(&self, responder: Responder<bool>);
    fn leave_game(&self, responder: Responder<()>);
}

/// Network boundary for friends, friend requests and game invites.
pub trait SocialGateway {
    fn fetch_roster(&self, responder: Responder<RosterSnapshot>);
    fn accept_friend_request(&self, request_id: &str, responder: Responder<()>);
    fn reject_friend_request(&self, request_id: &str, responder: Responder<()>);
    fn remove_friend(&self, friend_id: &str, responder: Responder<()>);
    fn accept_game_invite(&self, invite_id: &str, responder: Responder<()>);
    fn decline_game_invite(&self, invite_id: &str, responder: Responder<()>);
}
