//! In-memory conversation transcripts per room and user.
//!
//! Every transcript is seeded with a system prompt assembled from the
//! configured prompt template and the current global personality. Appends are
//! trimmed to a bounded window that always preserves the system turn.

use std::collections::HashMap;

use crate::ollama::{ChatMessage, Role};

/// Drop the oldest substantive turns until `messages` fits in `max_items`.
///
/// The system turn at index 0 (if any) is preserved; trimming stops rather
/// than delete it when it is the only message left.
pub fn trim_messages(messages: &mut Vec<ChatMessage>, max_items: usize) {
    while messages.len() > max_items {
        if messages[0].role == Role::System {
            if messages.len() > 1 {
                messages.remove(1);
            } else {
                break;
            }
        } else {
            messages.remove(0);
        }
    }
}

/// Per-(room, user) transcript store with system prompt support.
pub struct HistoryStore {
    prompt_prefix: String,
    prompt_suffix: String,
    // Optional brevity clause, included unless verbose mode is enabled.
    prompt_suffix_extra: String,
    include_extra: bool,
    personality: String,
    max_items: usize,
    rooms: HashMap<String, HashMap<String, Vec<ChatMessage>>>,
}

impl HistoryStore {
    pub fn new(
        prompt_prefix: impl Into<String>,
        prompt_suffix: impl Into<String>,
        prompt_suffix_extra: impl Into<String>,
        personality: impl Into<String>,
        max_items: usize,
    ) -> Self {
        Self {
            prompt_prefix: prompt_prefix.into(),
            prompt_suffix: prompt_suffix.into(),
            prompt_suffix_extra: prompt_suffix_extra.into(),
            include_extra: true,
            personality: personality.into(),
            max_items,
            rooms: HashMap::new(),
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn personality(&self) -> &str {
        &self.personality
    }

    /// Change the global personality. Affects only transcripts created (or
    /// re-seeded) afterwards.
    pub fn set_personality(&mut self, personality: &str) {
        self.personality = personality.to_string();
    }

    /// When verbose is on, the optional extra suffix is omitted from new
    /// system prompts.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.include_extra = !verbose;
    }

    fn full_suffix(&self) -> String {
        if self.include_extra && !self.prompt_suffix_extra.is_empty() {
            format!("{}{}", self.prompt_suffix, self.prompt_suffix_extra)
        } else {
            self.prompt_suffix.clone()
        }
    }

    fn system_content(&self, persona: &str) -> String {
        format!("{}{}{}", self.prompt_prefix, persona, self.full_suffix())
    }

    /// Idempotent: create the transcript seeded with the current global
    /// personality if it does not exist yet.
    pub fn ensure(&mut self, room: &str, user: &str) {
        let seed = self.system_content(&self.personality);
        let users = self.rooms.entry(room.to_string()).or_default();
        users
            .entry(user.to_string())
            .or_insert_with(|| vec![ChatMessage::system(seed)]);
    }

    /// Replace the transcript with a single system message.
    ///
    /// A non-empty `custom` becomes the system content verbatim; otherwise a
    /// non-empty `persona` is wrapped in the prompt template; otherwise the
    /// current global personality is used. Any prior turns are discarded.
    pub fn init_prompt(&mut self, room: &str, user: &str, persona: Option<&str>, custom: Option<&str>) {
        let content = match custom {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => {
                let persona = persona.filter(|p| !p.is_empty()).unwrap_or(&self.personality);
                self.system_content(persona)
            }
        };
        let users = self.rooms.entry(room.to_string()).or_default();
        users.insert(user.to_string(), vec![ChatMessage::system(content)]);
    }

    /// Append a turn and trim the transcript to the configured window.
    pub fn add(&mut self, room: &str, user: &str, role: Role, content: &str) {
        self.ensure(room, user);
        if let Some(messages) = self.rooms.get_mut(room).and_then(|users| users.get_mut(user)) {
            messages.push(ChatMessage::plain(role, content));
            trim_messages(messages, self.max_items);
        }
    }

    /// Return a copy of the transcript, creating it if absent.
    pub fn get(&mut self, room: &str, user: &str) -> Vec<ChatMessage> {
        self.ensure(room, user);
        self.rooms
            .get(room)
            .and_then(|users| users.get(user))
            .cloned()
            .unwrap_or_default()
    }

    /// Clear the transcript. Unless `stock`, immediately re-seed it with the
    /// current global personality; with `stock` it stays empty until the next
    /// `add`.
    pub fn reset(&mut self, room: &str, user: &str, stock: bool) {
        let users = self.rooms.entry(room.to_string()).or_default();
        users.insert(user.to_string(), Vec::new());
        if !stock {
            self.init_prompt(room, user, None, None);
        }
    }

    /// Drop every transcript in every room.
    pub fn clear_all(&mut self) {
        self.rooms.clear();
    }

    /// Users with existing history in a room, sorted for deterministic
    /// iteration order.
    pub fn users_in_room(&self, room: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .rooms
            .get(room)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    pub fn has_history(&self, room: &str, user: &str) -> bool {
        self.rooms
            .get(room)
            .map(|users| users.contains_key(user))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_items: usize) -> HistoryStore {
        HistoryStore::new("you are ", ".", " Be brief.", "a helpful bot", max_items)
    }

    #[test]
    fn test_seed_invariant() {
        let mut store = store(24);
        let messages = store.get("!room", "@alice");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "you are a helpful bot. Be brief.");
    }

    #[test]
    fn test_verbose_omits_extra_suffix_for_new_transcripts() {
        let mut store = store(24);
        store.set_verbose(true);
        let messages = store.get("!room", "@alice");
        assert_eq!(messages[0].content, "you are a helpful bot.");
    }

    #[test]
    fn test_trim_preserves_system_prompt() {
        for max_items in 2..=6 {
            let mut store = store(max_items);
            for i in 0..20 {
                store.add("!room", "@alice", Role::User, &format!("msg {i}"));
            }
            let messages = store.get("!room", "@alice");
            assert!(messages.len() <= max_items, "len {} > {}", messages.len(), max_items);
            assert_eq!(messages[0].role, Role::System);
            // Newest turn survives.
            assert_eq!(messages.last().unwrap().content, "msg 19");
        }
    }

    #[test]
    fn test_trim_without_system_prompt_drops_oldest() {
        let mut store = store(3);
        store.reset("!room", "@alice", true);
        for i in 0..10 {
            store.add("!room", "@alice", Role::User, &format!("msg {i}"));
        }
        let messages = store.get("!room", "@alice");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "msg 7");
    }

    #[test]
    fn test_trim_never_deletes_sole_system_turn() {
        let mut messages = vec![ChatMessage::system("seed")];
        trim_messages(&mut messages, 0);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn test_init_prompt_custom_overrides_everything() {
        let mut store = store(24);
        store.add("!room", "@alice", Role::User, "hi");
        store.add("!room", "@alice", Role::Assistant, "hello");
        store.init_prompt("!room", "@alice", None, Some("X"));
        let messages = store.get("!room", "@alice");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "X");
    }

    #[test]
    fn test_init_prompt_persona_uses_template() {
        let mut store = store(24);
        store.init_prompt("!room", "@alice", Some("a pirate"), None);
        let messages = store.get("!room", "@alice");
        assert_eq!(messages[0].content, "you are a pirate. Be brief.");
    }

    #[test]
    fn test_init_prompt_empty_persona_falls_back_to_personality() {
        let mut store = store(24);
        store.init_prompt("!room", "@alice", Some(""), None);
        let messages = store.get("!room", "@alice");
        assert_eq!(messages[0].content, "you are a helpful bot. Be brief.");
    }

    #[test]
    fn test_reset_reseeds_with_current_personality() {
        let mut store = store(24);
        store.add("!room", "@alice", Role::User, "hi");
        store.set_personality("a grumpy cat");
        store.reset("!room", "@alice", false);
        let messages = store.get("!room", "@alice");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "you are a grumpy cat. Be brief.");
    }

    #[test]
    fn test_reset_stock_leaves_transcript_empty() {
        let mut store = store(24);
        store.add("!room", "@alice", Role::User, "hi");
        store.reset("!room", "@alice", true);
        assert!(store.has_history("!room", "@alice"));
        // Empty until the next add; get() must not re-seed an existing entry.
        let messages = store.get("!room", "@alice");
        assert!(messages.is_empty());
        store.add("!room", "@alice", Role::User, "first");
        let messages = store.get("!room", "@alice");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[test]
    fn test_get_returns_a_copy() {
        let mut store = store(24);
        let mut copy = store.get("!room", "@alice");
        copy.push(ChatMessage::user("not stored"));
        assert_eq!(store.get("!room", "@alice").len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let mut store = store(24);
        store.add("!a", "@alice", Role::User, "hi");
        store.add("!b", "@bob", Role::User, "hi");
        store.clear_all();
        assert!(!store.has_history("!a", "@alice"));
        assert!(!store.has_history("!b", "@bob"));
    }

    #[test]
    fn test_users_in_room_sorted() {
        let mut store = store(24);
        store.ensure("!room", "@zed:hs");
        store.ensure("!room", "@alice:hs");
        store.ensure("!other", "@mallory:hs");
        assert_eq!(store.users_in_room("!room"), vec!["@alice:hs", "@zed:hs"]);
        assert!(store.users_in_room("!missing").is_empty());
    }
}
