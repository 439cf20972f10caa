//! Transaction control commands and their replies.

use doctxn_codec::Document;
use serde::Serialize;

/// The three transaction control commands.
///
/// Any other command name is not a transaction command and is left to the
/// caller's dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `beginTransaction`
    BeginTransaction,
    /// `commitTransaction`
    CommitTransaction,
    /// `rollbackTransaction`
    RollbackTransaction,
}

impl Command {
    /// Parses a command name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "beginTransaction" => Some(Self::BeginTransaction),
            "commitTransaction" => Some(Self::CommitTransaction),
            "rollbackTransaction" => Some(Self::RollbackTransaction),
            _ => None,
        }
    }

    /// Parses a command document such as `{beginTransaction: 1}`. The first
    /// field names the command.
    #[must_use]
    pub fn from_document(doc: &Document) -> Option<Self> {
        doc.iter().next().and_then(|(name, _)| Self::from_name(name))
    }

    /// Wire name of the command.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BeginTransaction => "beginTransaction",
            Self::CommitTransaction => "commitTransaction",
            Self::RollbackTransaction => "rollbackTransaction",
        }
    }
}

/// Successful reply to a transaction command: `{ok: 1, status: "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    /// Always `1` for a reply; failures are errors.
    pub ok: i32,
    /// Human-readable outcome.
    pub status: String,
}

impl CommandReply {
    /// Status after `beginTransaction`.
    pub const BEGAN: &'static str = "transaction began";
    /// Status after `commitTransaction`.
    pub const COMMITTED: &'static str = "transaction committed";
    /// Status after `rollbackTransaction`.
    pub const ROLLED_BACK: &'static str = "transaction rolled back";

    fn ok(status: &str) -> Self {
        Self {
            ok: 1,
            status: status.to_string(),
        }
    }

    pub(crate) fn began() -> Self {
        Self::ok(Self::BEGAN)
    }

    pub(crate) fn committed() -> Self {
        Self::ok(Self::COMMITTED)
    }

    pub(crate) fn rolled_back() -> Self {
        Self::ok(Self::ROLLED_BACK)
    }

    /// Document form, for callers that speak documents.
    #[must_use]
    pub fn to_document(&self) -> Document {
        Document::new()
            .with("ok", i64::from(self.ok))
            .with("status", self.status.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_only() {
        for command in [
            Command::BeginTransaction,
            Command::CommitTransaction,
            Command::RollbackTransaction,
        ] {
            assert_eq!(Command::from_name(command.name()), Some(command));
        }
        assert_eq!(Command::from_name("insert"), None);
        assert_eq!(Command::from_name("BeginTransaction"), None);
    }

    #[test]
    fn first_field_names_the_command() {
        let doc = Document::new().with("commitTransaction", 1).with("comment", "x");
        assert_eq!(Command::from_document(&doc), Some(Command::CommitTransaction));
        assert_eq!(Command::from_document(&Document::new()), None);
    }

    #[test]
    fn reply_shape() {
        let reply = CommandReply::began();
        assert_eq!(reply.ok, 1);
        assert_eq!(reply.status, "transaction began");
        assert_eq!(
            reply.to_document().get("status").and_then(|v| v.as_text()),
            Some("transaction began")
        );
    }
}
