//! Chat history ring and `!command` parsing.
//!
//! Every accepted chat line is recorded, commands included. The ring keeps
//! the most recent 500 records in FIFO order.

use std::{collections::VecDeque, time::SystemTime};

/// Maximum records kept in the chat ring.
pub const CHAT_HISTORY_LIMIT: usize = 500;

/// One recorded chat line.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    /// When the line was received.
    pub time: SystemTime,
    /// Sender uid.
    pub uid: u32,
    /// Sender nickname at the time.
    pub nickname: String,
    /// The chat text.
    pub message: String,
}

/// Bounded ring of recent chat lines.
#[derive(Debug, Default)]
pub struct ChatHistory {
    records: VecDeque<ChatRecord>,
}

impl ChatHistory {
    /// Empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chat line, evicting the oldest once the ring is full.
    pub fn push(&mut self, uid: u32, nickname: String, message: String) {
        if self.records.len() >= CHAT_HISTORY_LIMIT {
            self.records.pop_front();
        }
        self.records.push_back(ChatRecord { time: SystemTime::now(), uid, nickname, message });
    }

    /// Records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ChatRecord> {
        self.records.iter()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether any record is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `!version`
    Version,
    /// `!list`
    List,
    /// `!bans`
    Bans,
    /// `!kick <uid> <reason>`
    Kick {
        /// Target uid.
        uid: u32,
        /// Reason relayed to the kicked client.
        reason: String,
    },
    /// `!ban <uid> <reason>`
    Ban {
        /// Target uid.
        uid: u32,
        /// Reason stored with the ban.
        reason: String,
    },
    /// `!unban <uid>`
    Unban {
        /// uid the ban was created for.
        uid: u32,
    },
    /// A recognized moderation command with missing or unparseable
    /// arguments. The verb is kept so authorization is checked before any
    /// usage hint goes back.
    Malformed {
        /// Command verb ("kick", "ban", "unban") for the refusal line.
        command: &'static str,
        /// Usage line sent back to an authorized sender.
        usage: &'static str,
    },
    /// Starts with `!` but matches nothing we know.
    Unknown,
}

/// Parse a chat line as a command. `None` unless it starts with `!`.
#[must_use]
pub fn parse_command(text: &str) -> Option<ChatCommand> {
    let text = text.strip_prefix('!')?;
    let mut words = text.split_whitespace();

    let command = match words.next() {
        Some("version") => ChatCommand::Version,
        Some("list") => ChatCommand::List,
        Some("bans") => ChatCommand::Bans,
        Some("kick") => match parse_uid_reason(words) {
            Some((uid, reason)) => ChatCommand::Kick { uid, reason },
            None => ChatCommand::Malformed {
                command: "kick",
                usage: "usage: !kick <uid> <message>",
            },
        },
        Some("ban") => match parse_uid_reason(words) {
            Some((uid, reason)) => ChatCommand::Ban { uid, reason },
            None => ChatCommand::Malformed {
                command: "ban",
                usage: "usage: !ban <uid> <message>",
            },
        },
        Some("unban") => match words.next().and_then(|w| w.parse().ok()) {
            Some(uid) => ChatCommand::Unban { uid },
            None => ChatCommand::Malformed {
                command: "unban",
                usage: "usage: !unban <uid>",
            },
        },
        _ => ChatCommand::Unknown,
    };

    Some(command)
}

fn parse_uid_reason<'a>(mut words: impl Iterator<Item = &'a str>) -> Option<(u32, String)> {
    let uid = words.next()?.parse().ok()?;
    let reason = words.collect::<Vec<_>>().join(" ");
    let reason = reason.trim().to_string();
    if reason.is_empty() {
        return None;
    }
    Some((uid, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_ring_is_bounded_fifo() {
        let mut history = ChatHistory::new();
        for i in 0..(CHAT_HISTORY_LIMIT + 40) {
            history.push(1, "alice".to_string(), format!("msg {i}"));
        }

        assert_eq!(history.len(), CHAT_HISTORY_LIMIT);

        // The 40 oldest were evicted; the ring starts at msg 40.
        let first = history.records().next().unwrap();
        assert_eq!(first.message, "msg 40");
        let last = history.records().last().unwrap();
        assert_eq!(last.message, format!("msg {}", CHAT_HISTORY_LIMIT + 39));
    }

    #[test]
    fn plain_chat_is_not_a_command() {
        assert_eq!(parse_command("hello everyone"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn parse_moderation_commands() {
        assert_eq!(
            parse_command("!kick 3 being rude"),
            Some(ChatCommand::Kick { uid: 3, reason: "being rude".to_string() })
        );
        assert_eq!(
            parse_command("!ban 7 swearing"),
            Some(ChatCommand::Ban { uid: 7, reason: "swearing".to_string() })
        );
        assert_eq!(parse_command("!unban 7"), Some(ChatCommand::Unban { uid: 7 }));
    }

    #[test]
    fn parse_info_commands() {
        assert_eq!(parse_command("!version"), Some(ChatCommand::Version));
        assert_eq!(parse_command("!list"), Some(ChatCommand::List));
        assert_eq!(parse_command("!bans"), Some(ChatCommand::Bans));
    }

    #[test]
    fn malformed_commands_produce_usage() {
        assert_eq!(
            parse_command("!kick"),
            Some(ChatCommand::Malformed {
                command: "kick",
                usage: "usage: !kick <uid> <message>"
            })
        );
        assert!(matches!(parse_command("!kick 3"), Some(ChatCommand::Malformed { .. })));
        assert!(matches!(parse_command("!kick abc bye"), Some(ChatCommand::Malformed { .. })));
        assert_eq!(
            parse_command("!unban x"),
            Some(ChatCommand::Malformed { command: "unban", usage: "usage: !unban <uid>" })
        );
    }

    #[test]
    fn unknown_commands_are_flagged() {
        assert_eq!(parse_command("!teleport 1 2 3"), Some(ChatCommand::Unknown));
    }
}
