//! Command routing: maps the leading token of a room message to a command.
//!
//! Dispatch is pure and synchronous; it performs no I/O and never fails, it
//! just declines to match.

use std::collections::HashMap;

/// Closed set of bot commands. Handlers live in [`crate::handlers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `.ai` / mention form: converse on the sender's transcript.
    Ai,
    /// `.x`: converse on another user's transcript.
    CrossUser,
    /// `.persona`: adopt a persona via the prompt template.
    Persona,
    /// `.custom`: verbatim system prompt replacement.
    Custom,
    /// `.reset`: clear and re-seed the sender's transcript.
    Reset,
    /// `.stock`: clear the sender's transcript, no system prompt.
    Stock,
    /// `.help`: send the help menu.
    Help,
    /// `.model`: view or switch the active model (admin).
    Model,
    /// `.clear`: global reset (admin).
    Clear,
    /// `.verbose`: toggle brevity-clause omission (admin).
    Verbose,
    /// `.auth`: add an admin (owner only).
    Auth,
    /// `.deauth`: remove an admin (owner only).
    Deauth,
    /// `.gpersona`: change the global personality (owner only).
    GlobalPersona,
}

/// Token the mention form (`BotName: ...`) is aliased to.
const CANONICAL_ASK: &str = ".ai";

/// Maps literal leading tokens to commands, with a separate table for
/// admin-gated tokens.
#[derive(Default)]
pub struct Router {
    handlers: HashMap<String, Command>,
    admin_handlers: HashMap<String, Command>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under a token. Last registration wins.
    pub fn register(&mut self, token: &str, command: Command, admin: bool) {
        if admin {
            self.admin_handlers.insert(token.to_string(), command);
        } else {
            self.handlers.insert(token.to_string(), command);
        }
    }

    /// Resolve a raw message into a command and its argument text.
    ///
    /// The first whitespace token is the command; the remaining tokens,
    /// re-joined with single spaces, are the arguments. With a `bot_name`,
    /// the exact mention form `"<bot_name>:"` dispatches to whatever is
    /// registered under `.ai`. Admin tokens without `is_admin` and unknown
    /// tokens both yield `None`.
    pub fn dispatch(
        &self,
        text: &str,
        is_admin: bool,
        bot_name: Option<&str>,
    ) -> Option<(Command, String)> {
        let mut parts = text.split_whitespace();
        let first = parts.next()?;
        let args = parts.collect::<Vec<_>>().join(" ");

        if let Some(bot_name) = bot_name {
            if first == format!("{bot_name}:") {
                return self.handlers.get(CANONICAL_ASK).map(|&cmd| (cmd, args));
            }
        }
        if let Some(&cmd) = self.handlers.get(first) {
            return Some((cmd, args));
        }
        if is_admin {
            if let Some(&cmd) = self.admin_handlers.get(first) {
                return Some((cmd, args));
            }
        }
        None
    }
}

/// The full command table for the bot.
pub fn build_router() -> Router {
    let mut router = Router::new();
    router.register(".ai", Command::Ai, false);
    router.register(".x", Command::CrossUser, false);
    router.register(".persona", Command::Persona, false);
    router.register(".custom", Command::Custom, false);
    router.register(".reset", Command::Reset, false);
    router.register(".stock", Command::Stock, false);
    router.register(".help", Command::Help, false);
    router.register(".model", Command::Model, true);
    router.register(".clear", Command::Clear, true);
    router.register(".verbose", Command::Verbose, true);
    router.register(".auth", Command::Auth, true);
    router.register(".deauth", Command::Deauth, true);
    router.register(".gpersona", Command::GlobalPersona, true);
    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_dispatch() {
        let router = build_router();
        let (cmd, args) = router.dispatch(".ai hello there", false, None).unwrap();
        assert_eq!(cmd, Command::Ai);
        assert_eq!(args, "hello there");
    }

    #[test]
    fn test_args_rejoined_with_single_spaces() {
        let router = build_router();
        let (_, args) = router.dispatch("  .ai   spaced \t out  ", false, None).unwrap();
        assert_eq!(args, "spaced out");
    }

    #[test]
    fn test_mention_alias_matches_ask() {
        let router = build_router();
        let mention = router.dispatch("Bot: hello", false, Some("Bot")).unwrap();
        let direct = router.dispatch(".ai hello", false, Some("Bot")).unwrap();
        assert_eq!(mention, direct);
        assert_eq!(mention.1, "hello");
    }

    #[test]
    fn test_mention_requires_exact_colon_form() {
        let router = build_router();
        assert!(router.dispatch("Bot hello", false, Some("Bot")).is_none());
        assert!(router.dispatch("bot: hello", false, Some("Bot")).is_none());
        assert!(router.dispatch("Bot:: hello", false, Some("Bot")).is_none());
    }

    #[test]
    fn test_admin_gate() {
        let router = build_router();
        assert!(router.dispatch(".model reset", false, None).is_none());
        let (cmd, args) = router.dispatch(".model reset", true, None).unwrap();
        assert_eq!(cmd, Command::Model);
        assert_eq!(args, "reset");
    }

    #[test]
    fn test_unknown_and_empty_messages() {
        let router = build_router();
        assert!(router.dispatch(".nope hi", true, None).is_none());
        assert!(router.dispatch("", false, None).is_none());
        assert!(router.dispatch("   ", false, None).is_none());
        assert!(router.dispatch("plain chatter", true, None).is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut router = Router::new();
        router.register(".ai", Command::Help, false);
        router.register(".ai", Command::Ai, false);
        let (cmd, _) = router.dispatch(".ai hi", false, None).unwrap();
        assert_eq!(cmd, Command::Ai);
    }

    #[test]
    fn test_no_args_yields_empty_string() {
        let router = build_router();
        let (cmd, args) = router.dispatch(".reset", false, None).unwrap();
        assert_eq!(cmd, Command::Reset);
        assert_eq!(args, "");
    }
}
