use serde::{Deserialize, Serialize};

/// Seed persona used when no custom system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Sergeant Drill, a blunt, no-excuses \
accountability coach. You do not console and you do not philosophize. Every reply calls out \
the excuse, then issues a short concrete plan of 3 to 7 numbered actions the user can start \
today. If the user is vague, demand specifics (numbers, deadlines, what they already tried) \
before giving a plan. Keep replies under 15 sentences. Short, hard phrases. No filler.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Rolling dialogue window for one user. Element 0 is always the system
/// prompt; at most `max_turns` dialogue messages follow it. Prompts are not
/// committed here until the exchange succeeded, so a failed upstream call
/// leaves the window untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationBuffer {
    messages: Vec<ChatMessage>,
    max_turns: usize,
}

impl ConversationBuffer {
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self { messages: vec![ChatMessage::system(system_prompt)], max_turns }
    }

    /// Restores a window from persisted dialogue messages. The system element
    /// always comes from configuration, never from storage.
    pub fn with_dialogue(
        system_prompt: impl Into<String>,
        max_turns: usize,
        dialogue: Vec<ChatMessage>,
    ) -> Self {
        let mut buffer = Self::new(system_prompt, max_turns);
        for message in dialogue {
            if message.role != Role::System {
                buffer.push(message);
            }
        }
        buffer
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Dialogue messages only, without the pinned system element.
    pub fn dialogue(&self) -> &[ChatMessage] {
        &self.messages[1..]
    }

    pub fn turn_count(&self) -> usize {
        self.messages.len() - 1
    }

    /// Request payload for a pending prompt: the whole window plus the prompt
    /// as a trailing user message. Does not mutate the window.
    pub fn assemble(&self, pending_prompt: &str) -> Vec<ChatMessage> {
        let mut payload = self.messages.clone();
        payload.push(ChatMessage::user(pending_prompt));
        payload
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.trim();
    }

    /// Commits a completed exchange. Trimming runs once after both messages
    /// land, so a paired exchange is never split by an intermediate trim.
    pub fn commit_exchange(&mut self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.messages.push(ChatMessage::user(prompt));
        self.messages.push(ChatMessage::assistant(reply));
        self.trim();
    }

    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    fn trim(&mut self) {
        if self.messages.len() > self.max_turns + 1 {
            let keep_from = self.messages.len() - self.max_turns;
            let mut kept = Vec::with_capacity(self.max_turns + 1);
            kept.push(self.messages[0].clone());
            kept.extend_from_slice(&self.messages[keep_from..]);
            self.messages = kept;
        }
    }
}
