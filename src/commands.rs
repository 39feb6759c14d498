use crate::application::Action;
use lobby_core::remote::structs::GameType;
use regex::Regex;

lazy_static! {
    static ref CREATE: Regex =
        Regex::new(r"(?i)^create\s+(ludo|makao)\s+(\d{1,3})(\s+private)?(?:\s+(.*))?$").unwrap();
    static ref JOIN: Regex = Regex::new(r"(?i)^join\s+(ludo|makao)\s+(\S+)$").unwrap();
    static ref ENTRY: Regex = Regex::new(
        r"(?i)^(accept-friend|reject-friend|unfriend|accept-invite|decline-invite)\s+(\S+)$"
    )
    .unwrap();
}

fn game_type(name: &str) -> GameType {
    if name.eq_ignore_ascii_case("makao") {
        GameType::Makao
    } else {
        GameType::Ludo
    }
}

/// Turn one input line into an action. The error is meant for the player.
pub fn parse(line: &str) -> Result<Action, String> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "leave" => return Ok(Action::LeaveLobby),
        "check" => return Ok(Action::CheckActiveGame),
        "abandon" => return Ok(Action::LeaveActiveGame),
        "sync" => return Ok(Action::SyncRoster),
        "show" => return Ok(Action::Show),
        "events" => return Ok(Action::History),
        "yes" | "y" => return Ok(Action::Confirm),
        "no" | "n" => return Ok(Action::Cancel),
        "help" | "?" => return Ok(Action::Help),
        "exit" | "quit" => return Ok(Action::Exit),
        _ => {}
    }

    if let Some(captures) = CREATE.captures(line) {
        let capacity = captures[2]
            .parse::<u8>()
            .map_err(|_| format!("{} is not a valid player count", &captures[2]))?;
        return Ok(Action::CreateLobby {
            game_type: game_type(&captures[1]),
            capacity,
            is_private: captures.get(3).is_some(),
            name: captures
                .get(4)
                .map(|m| m.as_str().to_owned())
                .unwrap_or_default(),
        });
    }
    if let Some(captures) = JOIN.captures(line) {
        let target = &captures[2];
        let random = target.eq_ignore_ascii_case("random");
        return Ok(Action::JoinLobby {
            game_type: game_type(&captures[1]),
            code: if random { None } else { Some(target.to_owned()) },
            random,
        });
    }
    if let Some(captures) = ENTRY.captures(line) {
        let id = captures[2].to_owned();
        return Ok(match captures[1].to_ascii_lowercase().as_str() {
            "accept-friend" => Action::AcceptFriendRequest { request_id: id },
            "reject-friend" => Action::RejectFriendRequest { request_id: id },
            "unfriend" => Action::RemoveFriend { friend_id: id },
            "accept-invite" => Action::AcceptInvite { invite_id: id },
            _ => Action::DeclineInvite { invite_id: id },
        });
    }
    Err(format!("Unknown command '{}', type help", line))
}
