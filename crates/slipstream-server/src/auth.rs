//! User authorization: flag bitset and the file-backed token index.
//!
//! The auth file maps opaque identity tokens to flags and a display name.
//! File-sourced flags are always masked before use: only the server itself
//! may set RANKED or BANNED on a live entry.

use std::{
    collections::HashMap,
    io::{self, BufRead, BufReader},
    path::Path,
    sync::Arc,
};

use bitflags::bitflags;

use crate::listing::MasterListClient;

bitflags! {
    /// Authorization flags attached to each connected client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AuthFlags: u32 {
        /// Server administrator. Also the selector for the authed broadcast
        /// scope (bot relays).
        const ADMIN = 1 << 0;
        /// Moderator: may kick, ban and unban.
        const MOD = 1 << 1;
        /// Ranked player. Only grantable by the server, never by the file.
        const RANKED = 1 << 2;
        /// Automated client.
        const BOT = 1 << 3;
        /// Banned. Only grantable by the in-memory ban list.
        const BANNED = 1 << 4;
    }
}

impl AuthFlags {
    /// Flags a file entry may carry. RANKED and BANNED are server-side state.
    pub const FILE_MASK: Self = Self::ADMIN.union(Self::MOD).union(Self::BOT);

    /// One letter per flag (`A`/`M`/`R`/`B`/`X`), as shown in listings.
    #[must_use]
    pub fn letters(&self) -> String {
        let mut out = String::with_capacity(5);
        if self.contains(Self::ADMIN) {
            out.push('A');
        }
        if self.contains(Self::MOD) {
            out.push('M');
        }
        if self.contains(Self::RANKED) {
            out.push('R');
        }
        if self.contains(Self::BOT) {
            out.push('B');
        }
        if self.contains(Self::BANNED) {
            out.push('X');
        }
        out
    }

    /// Whether these flags authorize moderation commands.
    #[must_use]
    pub fn is_moderator(&self) -> bool {
        self.intersects(Self::ADMIN | Self::MOD)
    }
}

/// Lifecycle events reported for ranked users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEventKind {
    /// User was admitted.
    Join,
    /// User left gracefully.
    Leave,
    /// User's connection died.
    Crash,
}

impl UserEventKind {
    /// Wire label for the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Crash => "crash",
        }
    }
}

/// File-backed token → (flags, nickname) index.
pub struct UserAuth {
    entries: HashMap<String, (AuthFlags, String)>,
    events: Option<Arc<dyn MasterListClient>>,
}

impl UserAuth {
    /// Load the auth file.
    ///
    /// Format: one `token flags nickname` entry per line, whitespace
    /// separated, `flags` decimal; `#` starts a comment. Unparseable lines
    /// are skipped with a warning.
    pub fn load(path: &Path, events: Option<Arc<dyn MasterListClient>>) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut entries = HashMap::new();

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.splitn(3, char::is_whitespace);
            let parsed = match (parts.next(), parts.next(), parts.next()) {
                (Some(token), Some(flags), nickname) => flags
                    .parse::<u32>()
                    .ok()
                    .map(|bits| (token, AuthFlags::from_bits_truncate(bits), nickname)),
                _ => None,
            };

            match parsed {
                Some((token, flags, nickname)) => {
                    entries.insert(
                        token.to_string(),
                        (flags, nickname.unwrap_or_default().trim().to_string()),
                    );
                },
                None => {
                    tracing::warn!(line = lineno + 1, path = %path.display(), "skipping malformed auth entry");
                },
            }
        }

        tracing::info!(users = entries.len(), path = %path.display(), "auth file loaded");
        Ok(Self { entries, events })
    }

    /// Build an index from in-memory entries (embedding and tests).
    #[must_use]
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, AuthFlags, String)>,
        events: Option<Arc<dyn MasterListClient>>,
    ) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(token, flags, nickname)| (token, (flags, nickname)))
                .collect(),
            events,
        }
    }

    /// Resolve a token to its authorization flags.
    ///
    /// File-sourced RANKED and BANNED bits are masked out; unknown tokens
    /// resolve to no flags.
    #[must_use]
    pub fn resolve(&self, token: &str) -> AuthFlags {
        self.entries
            .get(token)
            .map_or(AuthFlags::empty(), |(flags, _)| *flags & AuthFlags::FILE_MASK)
    }

    /// Number of known tokens.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.entries.len()
    }

    /// Report a user lifecycle event, fire-and-forget.
    ///
    /// Runs on a separate task so callers are never blocked; without an
    /// event sink this only logs.
    pub fn send_user_event(&self, token: &str, kind: UserEventKind, nickname: &str, extra: &str) {
        match &self.events {
            Some(client) => {
                let client = Arc::clone(client);
                let (token, nickname, extra) =
                    (token.to_string(), nickname.to_string(), extra.to_string());
                tokio::spawn(async move {
                    client.user_event(token, kind, nickname, extra);
                });
            },
            None => {
                tracing::debug!(kind = kind.as_str(), nickname, "user event (no sink)");
            },
        }
    }
}
