use serde::{Deserialize, Serialize};

pub const ASSISTANT_ROLE: &str = "assistant";
/// Placed between rendered messages.
pub const MESSAGE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(ASSISTANT_ROLE, content)
    }

    pub fn render_markdown(&self) -> String {
        format!("**{}**\n\n{}", self.role, self.content.trim())
    }
}

/// Append-only list of messages shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    /// Drops the oldest messages so at most `keep` remain.
    pub fn retain_last(&mut self, keep: usize) {
        let excess = self.messages.len().saturating_sub(keep);
        self.messages.drain(..excess);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn render_markdown(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::render_markdown)
            .collect::<Vec<_>>()
            .join(MESSAGE_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::assistant("task"));
        transcript.push(ChatMessage::new("Manager", "done"));
        let roles: Vec<_> = transcript.messages().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["assistant", "Manager"]);
    }

    #[test]
    fn markdown_separates_messages() {
        let mut transcript = Transcript::new();
        transcript.extend([ChatMessage::assistant("a "), ChatMessage::new("Manager", "b")]);
        assert_eq!(
            transcript.render_markdown(),
            "**assistant**\n\na\n\n---\n\n**Manager**\n\nb"
        );
        assert_eq!(Transcript::new().render_markdown(), "");
    }

    #[test]
    fn streamed_messages_render_like_the_whole_transcript() {
        let messages = [ChatMessage::assistant("plan"), ChatMessage::new("Manager", " report\n")];
        let streamed = messages
            .iter()
            .map(ChatMessage::render_markdown)
            .collect::<Vec<_>>()
            .join(MESSAGE_SEPARATOR);
        let mut transcript = Transcript::new();
        transcript.extend(messages);
        assert_eq!(streamed, transcript.render_markdown());
        assert_eq!(
            ChatMessage::new("Manager", " report\n").render_markdown(),
            "**Manager**\n\nreport"
        );
    }

    #[test]
    fn retain_last_drops_oldest() {
        let mut transcript = Transcript::new();
        transcript.extend((0..5).map(|i| ChatMessage::assistant(&i.to_string())));
        transcript.retain_last(2);
        let contents: Vec<_> = transcript.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "4"]);
        transcript.retain_last(10);
        assert_eq!(transcript.len(), 2);
    }
}
