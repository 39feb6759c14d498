use std::rc::Rc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use lobby_core::remote::structs::GameType;
use lobby_core::{LobbyClient, LobbyEvent, Result};
use log::{debug, info};

use crate::config::ClientConfig;
use crate::loopback::LoopbackServer;
use crate::views::{self, EventLog};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CreateLobby {
        game_type: GameType,
        capacity: u8,
        name: String,
        is_private: bool,
    },
    JoinLobby {
        game_type: GameType,
        code: Option<String>,
        random: bool,
    },
    LeaveLobby,
    CheckActiveGame,
    LeaveActiveGame,
    SyncRoster,
    AcceptFriendRequest { request_id: String },
    RejectFriendRequest { request_id: String },
    RemoveFriend { friend_id: String },
    AcceptInvite { invite_id: String },
    DeclineInvite { invite_id: String },
    Show,
    History,
    Confirm,
    Cancel,
    Help,
    Exit,
}

pub enum State {
    Boot,
    Initialize,
    Run,
    Shutdown,
}

pub struct Application {
    pub state: State,
    config: ClientConfig,
    server: Rc<LoopbackServer>,
    client: Option<LobbyClient>,
    actions: Receiver<Action>,
    events: Vec<LobbyEvent>,
    history: EventLog,
    awaiting_confirmation: Option<Action>,
}

impl Application {
    pub fn new(config: ClientConfig, actions: Receiver<Action>) -> Self {
        Self {
            state: State::Boot,
            server: Rc::new(LoopbackServer::new(&config.username, config.loopback.clone())),
            history: EventLog::new(config.event_history),
            config,
            client: None,
            actions,
            events: Vec::with_capacity(256),
            awaiting_confirmation: None,
        }
    }

    fn initialize(&mut self) {
        let mut client = LobbyClient::new(
            self.config.store.clone(),
            self.server.clone(),
            self.server.clone(),
            self.server.clone(),
        );
        client.session_mut().check_active_session();
        self.client = Some(client);
        info!("Logged in as {}", self.config.username);
        println!("Welcome {}. Type help for the list of commands.", self.config.username);
    }

    fn tick(&mut self) {
        let timeout = Duration::from_millis(self.config.tick_interval_ms);
        match self.actions.recv_timeout(timeout) {
            Ok(action) => self.handle(action),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Input closed");
                self.state = State::Shutdown;
                return;
            }
        }
        self.update();
    }

    /// Move the server and the client forward and print what happened.
    fn update(&mut self) {
        self.server.advance();
        let client = match self.client.as_mut() {
            Some(client) => client,
            None => return,
        };
        client.tick();
        loop {
            client.poll_events(&mut self.events);
            if self.events.is_empty() {
                break;
            }
            for event in self.events.iter() {
                let line = views::event(event);
                println!("{}", line);
                self.history.push(line);
            }
        }
    }

    fn handle(&mut self, action: Action) {
        match action {
            Action::Confirm => match self.awaiting_confirmation.take() {
                Some(pending) => self.perform(pending),
                None => println!("Nothing to confirm"),
            },
            Action::Cancel => {
                if self.awaiting_confirmation.take().is_some() {
                    println!("Cancelled");
                }
            }
            Action::RemoveFriend { friend_id } => {
                println!("Remove {} from your friends? (yes/no)", friend_id);
                self.awaiting_confirmation = Some(Action::RemoveFriend { friend_id });
            }
            other => {
                if self.awaiting_confirmation.take().is_some() {
                    println!("Cancelled");
                }
                self.perform(other);
            }
        }
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::Help => println!("{}", views::HELP),
            Action::Exit => self.state = State::Shutdown,
            Action::History => {
                for line in self.history.lines() {
                    println!("{}", line);
                }
            }
            action => {
                let client = match self.client.as_mut() {
                    Some(client) => client,
                    None => return,
                };
                if let Err(err) = Self::dispatch(client, action) {
                    println!("{}", views::error(&err));
                }
            }
        }
    }

    fn dispatch(client: &mut LobbyClient, action: Action) -> Result<()> {
        match action {
            Action::CreateLobby {
                game_type,
                capacity,
                name,
                is_private,
            } => client
                .session_mut()
                .create_session(game_type, capacity, &name, is_private),
            Action::JoinLobby {
                game_type,
                code,
                random,
            } => client
                .session_mut()
                .join_session(code.as_deref(), random, game_type),
            Action::LeaveLobby => client.session_mut().leave_session(),
            Action::CheckActiveGame => {
                client.session_mut().check_active_session();
                Ok(())
            }
            Action::LeaveActiveGame => client.session_mut().leave_active_game(),
            Action::SyncRoster => {
                client.roster_mut().sync();
                Ok(())
            }
            Action::AcceptFriendRequest { request_id } => {
                client.roster_mut().accept_friend_request(&request_id)
            }
            Action::RejectFriendRequest { request_id } => {
                client.roster_mut().reject_friend_request(&request_id)
            }
            Action::RemoveFriend { friend_id } => client.roster_mut().remove_friend(&friend_id),
            Action::AcceptInvite { invite_id } => {
                let handoff = client.accept_game_invite_and_join(&invite_id)?;
                println!("Joining {} [{}]", handoff.lobby_name, handoff.game_type);
                Ok(())
            }
            Action::DeclineInvite { invite_id } => {
                client.roster_mut().decline_game_invite(&invite_id)
            }
            Action::Show => {
                match client.session().session() {
                    Some(session) if !client.session().is_connected() => println!(
                        "{}\n(live updates lost, showing last known state)",
                        views::session(session)
                    ),
                    Some(session) => println!("{}", views::session(session)),
                    None if client.session().is_entering() => println!("Entering a lobby..."),
                    None => println!("Not in a lobby"),
                }
                println!("{}", views::roster(client.roster()));
                Ok(())
            }
            Action::Help | Action::History | Action::Confirm | Action::Cancel | Action::Exit => {
                Ok(())
            }
        }
    }

    fn shutdown(&mut self) {
        // Dropping the client unsubscribes and discards late replies
        self.client = None;
        info!("Logged out");
    }

    pub fn run(mut self) {
        loop {
            match self.state {
                State::Boot => {
                    self.state = State::Initialize;
                }
                State::Initialize => {
                    self.initialize();
                    self.state = State::Run;
                }
                State::Run => self.tick(),
                State::Shutdown => {
                    self.shutdown();
                    break;
                }
            }
        }
    }
}
