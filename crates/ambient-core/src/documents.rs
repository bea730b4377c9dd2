//! The five durable memory documents.
//!
//! Each document is an opaque markdown blob. Structure inside a document is a
//! convention between the prompts, never something the engine enforces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentName {
    Identity,
    UserContext,
    ConversationSummary,
    ActiveThreads,
    Queue,
}

impl DocumentName {
    pub const ALL: [DocumentName; 5] = [
        Self::Identity,
        Self::UserContext,
        Self::ConversationSummary,
        Self::ActiveThreads,
        Self::Queue,
    ];

    /// Documents loaded for the cheap think step.
    pub const LIGHTWEIGHT: [DocumentName; 3] = [Self::Identity, Self::ActiveThreads, Self::Queue];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::UserContext => "user_context",
            Self::ConversationSummary => "conversation_summary",
            Self::ActiveThreads => "active_threads",
            Self::Queue => "queue",
        }
    }

    /// Name used when documents are presented to the completion service.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Identity => "identity.md",
            Self::UserContext => "user_context.md",
            Self::ConversationSummary => "conversation_summary.md",
            Self::ActiveThreads => "active_threads.md",
            Self::Queue => "queue.md",
        }
    }

    /// Content written the first time the store is opened.
    pub fn seed(&self) -> &'static str {
        match self {
            Self::Identity => {
                "# Identity\n\n\
                 I am an ambient companion. My memory documents give me continuity \
                 between conversations.\n\n\
                 ## Values\n\
                 - Be direct and honest\n\
                 - Build on earlier conversations\n\
                 - Reach out only when it is worth the interruption\n\
                 - Respect quiet time\n"
            }
            Self::UserContext => "# User Context\n\n*Nothing learned yet.*\n",
            Self::ConversationSummary => "# Conversation Summaries\n\n*No conversations yet.*\n",
            Self::ActiveThreads => "# Active Threads\n\n*No active threads.*\n",
            Self::Queue => {
                "# Queue\n\n## Follow-ups\n\n*Nothing queued.*\n\n\
                 ## Reminders\n\n*None.*\n\n## Ideas\n\n*None yet.*\n"
            }
        }
    }
}

impl std::fmt::Display for DocumentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentName {
    type Err = String;

    /// Accepts both the bare name (`queue`) and the file name (`queue.md`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.trim().strip_suffix(".md").unwrap_or(s.trim());
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == bare)
            .ok_or_else(|| format!("unknown memory document: {s}"))
    }
}

/// A point-in-time copy of document contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    docs: BTreeMap<DocumentName, String>,
}

impl MemorySnapshot {
    pub fn new(docs: BTreeMap<DocumentName, String>) -> Self {
        Self { docs }
    }

    pub fn get(&self, name: DocumentName) -> &str {
        self.docs.get(&name).map(String::as_str).unwrap_or("")
    }

    pub fn insert(&mut self, name: DocumentName, content: impl Into<String>) {
        self.docs.insert(name, content.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocumentName, &str)> {
        self.docs.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Join the given documents, skipping blank ones.
    pub fn render(&self, names: &[DocumentName]) -> String {
        names
            .iter()
            .map(|n| self.get(*n))
            .filter(|c| !c.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    pub fn render_all(&self) -> String {
        self.render(&DocumentName::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_bare_and_file_names() {
        assert_eq!("queue".parse::<DocumentName>().unwrap(), DocumentName::Queue);
        assert_eq!(
            "user_context.md".parse::<DocumentName>().unwrap(),
            DocumentName::UserContext
        );
        assert!("journal.md".parse::<DocumentName>().is_err());
    }

    #[test]
    fn every_document_has_a_seed() {
        for name in DocumentName::ALL {
            assert!(name.seed().starts_with("# "), "{name}");
            assert_eq!(name.file_name(), format!("{}.md", name.as_str()));
        }
    }

    #[test]
    fn render_skips_blank_documents() {
        let mut snap = MemorySnapshot::default();
        snap.insert(DocumentName::Identity, "# Identity");
        snap.insert(DocumentName::ActiveThreads, "   ");
        snap.insert(DocumentName::Queue, "# Queue");

        let rendered = snap.render(&DocumentName::LIGHTWEIGHT);
        assert_eq!(rendered, "# Identity\n\n---\n\n# Queue");
        assert_eq!(snap.get(DocumentName::UserContext), "");
    }
}
