//! Message model
//!
//! Messages are immutable once built: a locally typed line or the content of
//! one accepted inbound request. Notices carry non-fatal conditions (an
//! unreadable neighbor table, a peer that could not be reached) to the same
//! consumer so it can show them without the core knowing how.

use core::fmt;

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// Origin of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    /// Typed on this instance
    Local,
    /// Received from some peer; peers are not individually named
    Remote,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Local => "local",
            Sender::Remote => "remote",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    content: String,
    sender: Sender,
}

impl Message {
    pub fn new(content: impl Into<String>, sender: Sender) -> Self {
        Self {
            content: content.into(),
            sender,
        }
    }

    /// Message composed on this instance
    pub fn local(content: impl Into<String>) -> Self {
        Self::new(content, Sender::Local)
    }

    /// Message accepted from the network
    pub fn remote(content: impl Into<String>) -> Self {
        Self::new(content, Sender::Remote)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// Empty content is kept and shown as a placeholder rather than dropped
    pub fn is_placeholder(&self) -> bool {
        self.content.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Notices
// ----------------------------------------------------------------------------

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Non-fatal condition reported to the event consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    level: NoticeLevel,
    text: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, text)
    }

    pub fn level(&self) -> NoticeLevel {
        self.level
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Everything the core hands to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(Message),
    Notice(Notice),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_labels() {
        assert_eq!(Message::local("hi").sender().to_string(), "local");
        assert_eq!(Message::remote("hi").sender().to_string(), "remote");
    }

    #[test]
    fn test_empty_content_is_placeholder() {
        assert!(Message::remote("").is_placeholder());
        assert!(!Message::remote(" ").is_placeholder());
    }
}
