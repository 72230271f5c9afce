//! Rolling per-session conversation history used to ground model prompts.

use crate::protocol::ImagePayload;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Turns rendered into a grounded prompt unless the caller asks otherwise.
pub const DEFAULT_HISTORY_TURNS: usize = 10;

/// Hard cap on stored turns; older turns are dropped from the head.
pub const MAX_RETAINED_TURNS: usize = 100;

/// Bumped whenever the wording of the grounded prompt template changes.
pub const GROUNDED_PROMPT_VERSION: u32 = 1;

/// Placeholder recorded in the history when the user shares an image.
pub const IMAGE_PLACEHOLDER: &str = "[User shared an image for analysis]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug)]
pub struct ConversationContext {
    turns: VecDeque<Turn>,
    current_image: Option<Arc<ImagePayload>>,
    history_turns: usize,
    retained_turns: usize,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_HISTORY_TURNS, MAX_RETAINED_TURNS)
    }

    /// `history_turns` bounds what prompts see, `retained_turns` bounds what is stored.
    pub fn with_limits(history_turns: usize, retained_turns: usize) -> Self {
        let retained_turns = retained_turns.max(history_turns).max(1);
        Self {
            turns: VecDeque::with_capacity(retained_turns.min(64)),
            current_image: None,
            history_turns,
            retained_turns,
        }
    }

    fn push(&mut self, role: Role, content: String) {
        if self.turns.len() == self.retained_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn { role, content });
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.push(Role::User, text.into());
    }

    pub fn add_ai_response(&mut self, text: impl Into<String>) {
        self.push(Role::Assistant, text.into());
    }

    /// Marks `image` as the one under discussion and records a placeholder
    /// turn instead of the image itself.
    pub fn add_image_message(&mut self, image: Arc<ImagePayload>) {
        self.current_image = Some(image);
        self.push(Role::User, IMAGE_PLACEHOLDER.to_string());
    }

    /// Records that the user shared an image that could not be decoded. The
    /// current image, if any, stays as it was.
    pub fn add_unreadable_image_message(&mut self) {
        self.push(Role::User, IMAGE_PLACEHOLDER.to_string());
    }

    pub fn current_image(&self) -> Option<&Arc<ImagePayload>> {
        self.current_image.as_ref()
    }

    pub fn has_image(&self) -> bool {
        self.current_image.is_some()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent `max_turns` turns, oldest first. Nothing is formatted
    /// until the view is displayed or iterated, and it can be iterated again.
    pub fn render_history(&self, max_turns: usize) -> HistoryView<'_> {
        let skip = self.turns.len().saturating_sub(max_turns);
        HistoryView {
            context: self,
            skip,
        }
    }

    /// Wraps `new_prompt` with the recent history. With no history the
    /// prompt is returned unchanged.
    pub fn build_grounded_prompt(&self, new_prompt: &str) -> String {
        let history = self.render_history(self.history_turns);
        if history.is_empty() {
            return new_prompt.to_string();
        }
        format!(
            "\nPrevious conversation:\n{history}\n\nUser's new question: {new_prompt}\n\nPlease respond to the question in the context of our conversation.\n"
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryView<'a> {
    context: &'a ConversationContext,
    skip: usize,
}

impl<'a> HistoryView<'a> {
    pub fn turns(&self) -> impl Iterator<Item = &'a Turn> + 'a {
        self.context.turns.iter().skip(self.skip)
    }

    /// One `"<Role>: <content>\n"` line per turn.
    pub fn lines(&self) -> impl Iterator<Item = String> + 'a {
        self.turns()
            .map(|turn| format!("{}: {}\n", turn.role, turn.content))
    }

    pub fn len(&self) -> usize {
        self.context.turns.len() - self.skip
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for HistoryView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for turn in self.turns() {
            writeln!(f, "{}: {}", turn.role, turn.content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn image() -> Arc<ImagePayload> {
        Arc::new(ImagePayload::new("image/png", Bytes::from_static(b"\x89PNG")))
    }

    #[test]
    fn render_history_keeps_last_turns_oldest_first() {
        let mut context = ConversationContext::new();
        for i in 0..15 {
            context.add_user_message(format!("message {i}"));
        }

        let view = context.render_history(10);
        let lines: Vec<String> = view.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "User: message 5\n");
        assert_eq!(lines[9], "User: message 14\n");

        // The view can be walked again with the same result.
        assert_eq!(view.lines().count(), 10);
        assert_eq!(view.to_string(), lines.concat());
    }

    #[test]
    fn render_history_labels_roles() {
        let mut context = ConversationContext::new();
        context.add_user_message("Who painted this?");
        context.add_ai_response("It looks like a Monet.");

        assert_eq!(
            context.render_history(10).to_string(),
            "User: Who painted this?\nAssistant: It looks like a Monet.\n"
        );
    }

    #[test]
    fn grounded_prompt_without_history_is_unchanged() {
        let context = ConversationContext::new();
        let prompt = "What style is this?  ";
        assert_eq!(context.build_grounded_prompt(prompt), prompt);
    }

    #[test]
    fn grounded_prompt_wraps_history() {
        let mut context = ConversationContext::new();
        context.add_user_message("Who painted this?");
        context.add_ai_response("Claude Monet.");

        let prompt = context.build_grounded_prompt("When?");
        assert_eq!(
            prompt,
            "\nPrevious conversation:\nUser: Who painted this?\nAssistant: Claude Monet.\n\n\nUser's new question: When?\n\nPlease respond to the question in the context of our conversation.\n"
        );
    }

    #[test]
    fn grounded_prompt_respects_history_limit() {
        let mut context = ConversationContext::with_limits(2, 50);
        context.add_user_message("first");
        context.add_ai_response("second");
        context.add_user_message("third");

        let prompt = context.build_grounded_prompt("next");
        assert!(!prompt.contains("first"));
        assert!(prompt.contains("Assistant: second\nUser: third\n"));
    }

    #[test]
    fn image_message_sets_current_image_and_placeholder() {
        let mut context = ConversationContext::new();
        assert!(!context.has_image());

        context.add_image_message(image());

        assert!(context.has_image());
        assert_eq!(context.current_image().unwrap().mime_type(), "image/png");
        let turns: Vec<&Turn> = context.turns().collect();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, IMAGE_PLACEHOLDER);
    }

    #[test]
    fn unreadable_image_keeps_current_image() {
        let mut context = ConversationContext::new();
        context.add_unreadable_image_message();
        assert!(!context.has_image());

        context.add_image_message(image());
        context.add_unreadable_image_message();
        assert!(context.has_image());
        let turns: Vec<&str> = context.turns().map(|t| t.content.as_str()).collect();
        assert_eq!(turns, vec![IMAGE_PLACEHOLDER; 3]);
    }

    #[test]
    fn storage_truncates_at_head() {
        let mut context = ConversationContext::with_limits(3, 5);
        for i in 0..8 {
            context.add_ai_response(format!("reply {i}"));
        }
        assert_eq!(context.len(), 5);
        assert_eq!(context.turns().next().unwrap().content, "reply 3");
    }
}
