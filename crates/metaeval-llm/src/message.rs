//! Messages and the prompt assembler.
//!
//! Every backend builds its request from the same [`MessageSequence`], so a
//! given `(example, system_prompt)` pair carries byte-identical content no
//! matter how it is serialized afterwards.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User   => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// At most one system message, always first, followed by exactly one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MessageSequence(Vec<Message>);

impl MessageSequence {
    /// Build the turn sent for one example.
    pub fn assemble(example: &str, system_prompt: Option<&str>) -> Self {
        let user = Message::user(example);
        match system_prompt {
            None => Self(vec![user]),
            Some(system) => Self(vec![Message::system(system), user]),
        }
    }

    pub fn system(&self) -> Option<&str> {
        self.0.first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn user(&self) -> &str {
        // assemble() always pushes the user message last
        self.0.last().map(|m| m.content.as_str()).unwrap_or_default()
    }

    /// Messages without the system entry, for APIs that carry it out of band.
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.0.iter().filter(|m| m.role != Role::System)
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
