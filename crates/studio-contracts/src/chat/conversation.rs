use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a chat. `image` holds a `data:` URI and is only ever set on
/// assistant turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image: None,
        }
    }

    pub fn assistant(content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            image: image.filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn has_image(&self) -> bool {
        self.role == Role::Assistant && self.image.is_some()
    }

    /// Drops images that arrived on user turns (e.g. from a client payload).
    pub fn normalized(self) -> Self {
        match self.role {
            Role::User => Self::user(self.content),
            Role::Assistant => Self::assistant(self.content, self.image),
        }
    }
}

/// Append-only chat history owned by a single session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: impl IntoIterator<Item = ConversationTurn>) -> Self {
        Self {
            turns: turns.into_iter().map(ConversationTurn::normalized).collect(),
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &ConversationTurn {
        self.turns.push(ConversationTurn::user(content));
        &self.turns[self.turns.len() - 1]
    }

    pub fn push_assistant(
        &mut self,
        content: impl Into<String>,
        image: Option<String>,
    ) -> &ConversationTurn {
        self.turns.push(ConversationTurn::assistant(content, image));
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_image(&self) -> Option<&str> {
        last_image(&self.turns)
    }
}

/// Most recent assistant image in `turns`, if any.
pub(crate) fn last_image(turns: &[ConversationTurn]) -> Option<&str> {
    turns
        .iter()
        .rev()
        .filter(|turn| turn.has_image())
        .find_map(|turn| turn.image.as_deref())
}
