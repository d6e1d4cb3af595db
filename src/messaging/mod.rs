use std::sync::mpsc::{channel, Receiver, Sender};

use crate::model::BlacklistKind;

mod socket;

/// Starts listening for client commands. The returned receiver is meant to be drained by the poll
/// loop, so that every command is applied on the same thread as the polling itself.
pub fn setup_channel() -> Receiver<ClientMessage> {
    let (tx, rx): (Sender<ClientMessage>, Receiver<ClientMessage>) = channel();
    std::thread::spawn(move || {
        if let Err(err) = socket::open_and_listen_unix_socket(tx) {
            error!("Unable to open unix socket: {:?}", err);
        }
    });
    rx
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Blacklist the song, all artists, or the album of whatever is playing right now.
    BlockCurrent(BlacklistKind),
    UnblockCurrent(BlacklistKind),
    Block {
        kind: BlacklistKind,
        id: String,
        name: String,
    },
    Unblock {
        kind: BlacklistKind,
        id: String,
    },
    Skip,
    ShowBlacklist,
}

impl ClientMessage {
    pub fn parse(input: &str) -> Result<ClientMessage, String> {
        let input = input.trim();
        let mut words = input.split_whitespace();
        let command = words.next().ok_or("Empty message")?;
        let message = match command {
            "block_current_song" => ClientMessage::BlockCurrent(BlacklistKind::Song),
            "block_current_artists" => ClientMessage::BlockCurrent(BlacklistKind::Artist),
            "block_current_album" => ClientMessage::BlockCurrent(BlacklistKind::Album),
            "unblock_current_song" => ClientMessage::UnblockCurrent(BlacklistKind::Song),
            "unblock_current_artists" => ClientMessage::UnblockCurrent(BlacklistKind::Artist),
            "unblock_current_album" => ClientMessage::UnblockCurrent(BlacklistKind::Album),
            "block" => {
                let kind = words
                    .next()
                    .ok_or("block: kind is missing")?
                    .parse::<BlacklistKind>()?;
                let id = words.next().ok_or("block: id is missing")?.to_string();
                let name: Vec<&str> = words.by_ref().collect();
                // The name is for display only, so fall back to the id if none was given.
                let name = if name.is_empty() {
                    id.clone()
                } else {
                    name.join(" ")
                };
                ClientMessage::Block { kind, id, name }
            }
            "unblock" => {
                let kind = words
                    .next()
                    .ok_or("unblock: kind is missing")?
                    .parse::<BlacklistKind>()?;
                let id = words.next().ok_or("unblock: id is missing")?.to_string();
                ClientMessage::Unblock { kind, id }
            }
            "skip" => ClientMessage::Skip,
            "show_blacklist" => ClientMessage::ShowBlacklist,
            other => return Err(format!("ClientMessage not recognized: {}", other)),
        };

        match words.next() {
            Some(extra) => Err(format!("Unexpected argument for {}: {}", command, extra)),
            None => Ok(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_commands() {
        assert_eq!(
            ClientMessage::parse("block_current_song\n"),
            Ok(ClientMessage::BlockCurrent(BlacklistKind::Song))
        );
        assert_eq!(
            ClientMessage::parse("unblock_current_artists"),
            Ok(ClientMessage::UnblockCurrent(BlacklistKind::Artist))
        );
        assert_eq!(ClientMessage::parse(" skip "), Ok(ClientMessage::Skip));
        assert_eq!(
            ClientMessage::parse("show_blacklist"),
            Ok(ClientMessage::ShowBlacklist)
        );
    }

    #[test]
    fn parse_block_with_name() {
        assert_eq!(
            ClientMessage::parse("block artist 0OdUWJ0sBjDrqHygGUXeCF Band of Horses\n"),
            Ok(ClientMessage::Block {
                kind: BlacklistKind::Artist,
                id: "0OdUWJ0sBjDrqHygGUXeCF".to_string(),
                name: "Band of Horses".to_string(),
            })
        );
    }

    #[test]
    fn parse_block_without_name_uses_id() {
        assert_eq!(
            ClientMessage::parse("block albums al1"),
            Ok(ClientMessage::Block {
                kind: BlacklistKind::Album,
                id: "al1".to_string(),
                name: "al1".to_string(),
            })
        );
    }

    #[test]
    fn parse_unblock() {
        assert_eq!(
            ClientMessage::parse("unblock song s1"),
            Ok(ClientMessage::Unblock {
                kind: BlacklistKind::Song,
                id: "s1".to_string(),
            })
        );
    }

    #[test]
    fn parse_invalid_messages() {
        assert!(ClientMessage::parse("").is_err());
        assert!(ClientMessage::parse("block_everything").is_err());
        assert!(ClientMessage::parse("block playlist p1").is_err());
        assert!(ClientMessage::parse("unblock song").is_err());
        assert!(ClientMessage::parse("unblock song s1 s2").is_err());
        assert!(ClientMessage::parse("skip now").is_err());
    }
}
