//! Scene messages and the append-only message store.
//!
//! The store is an indexed arena: every message gets a stable sequence index
//! at append time and is never mutated afterwards. Snapshots share the
//! backing buffer copy-on-write, so taking one is O(1) and a snapshot never
//! observes messages appended after it was taken.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

/// Unique identifier for a scene (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SceneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of scene event a message records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// In-character dialogue or action
    Character,
    /// Narration
    Narrator,
    /// Out-of-character instruction aimed at a character's next turn
    Director,
    /// Engine-level notes (time passage, scene changes)
    System,
}

impl MessageKind {
    /// The kinds that carry narrative content.
    pub const DIALOGUE: [MessageKind; 2] = [MessageKind::Character, MessageKind::Narrator];

    pub fn is_dialogue(self) -> bool {
        matches!(self, MessageKind::Character | MessageKind::Narrator)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Character => "character",
            MessageKind::Narrator => "narrator",
            MessageKind::Director => "director",
            MessageKind::System => "system",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that has not been appended yet.
///
/// Only the store assigns sequence indices, so callers describe the message
/// and hand the draft over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub content: String,
}

impl NewMessage {
    /// A line spoken (or acted) by a character.
    pub fn character(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Character,
            speaker: Some(speaker.into()),
            content: content.into(),
        }
    }

    /// Narration.
    pub fn narrator(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Narrator,
            speaker: None,
            content: content.into(),
        }
    }

    /// An unattributed director instruction.
    pub fn director(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Director,
            speaker: None,
            content: content.into(),
        }
    }

    /// A director instruction addressed to one character.
    pub fn director_for(character: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Director,
            speaker: Some(character.into()),
            content: content.into(),
        }
    }

    /// An engine note.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            speaker: None,
            content: content.into(),
        }
    }
}

/// An entry in the scene log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMessage {
    /// Sequence index, strictly increasing in append order
    pub index: u64,

    /// Which kind of event this is
    pub kind: MessageKind,

    /// Character name for character messages; the addressee for director messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,

    /// The text content
    pub content: String,

    /// When the message was appended
    pub created_at: DateTime<Utc>,
}

impl SceneMessage {
    pub fn is_dialogue(&self) -> bool {
        self.kind.is_dialogue()
    }

    /// Whether this message is attributed to (or addressed to) `name`.
    pub fn is_for(&self, name: &str) -> bool {
        self.speaker.as_deref() == Some(name)
    }

    /// Render the message as a single prompt line.
    pub fn render_line(&self) -> String {
        match (self.kind, self.speaker.as_deref()) {
            (MessageKind::Character, Some(name)) => {
                // Character messages are often stored with the name prefix already.
                let prefix = format!("{name}:");
                if self.content.starts_with(&prefix) {
                    self.content.clone()
                } else {
                    format!("{prefix} {}", self.content)
                }
            }
            (MessageKind::Director, Some(name)) => {
                format!("(Director instructions for {name}: {})", self.content)
            }
            (MessageKind::Director, None) => format!("(Director instructions: {})", self.content),
            _ => self.content.clone(),
        }
    }
}

/// The append-only scene log.
#[derive(Debug, Clone)]
pub struct MessageStore {
    scene_id: SceneId,
    messages: Arc<Vec<Arc<SceneMessage>>>,
}

impl MessageStore {
    /// Create an empty store for a new scene.
    pub fn new() -> Self {
        Self::with_id(SceneId::new())
    }

    pub fn with_id(scene_id: SceneId) -> Self {
        Self {
            scene_id,
            messages: Arc::new(Vec::new()),
        }
    }

    /// Build a store by appending each draft in order.
    pub fn from_drafts(drafts: impl IntoIterator<Item = NewMessage>) -> Self {
        let mut store = Self::new();
        for draft in drafts {
            store.append(draft);
        }
        store
    }

    pub fn scene_id(&self) -> &SceneId {
        &self.scene_id
    }

    /// Append a message and return its sequence index.
    pub fn append(&mut self, draft: NewMessage) -> u64 {
        let index = self.messages.len() as u64;
        let message = SceneMessage {
            index,
            kind: draft.kind,
            speaker: draft.speaker,
            content: draft.content,
            created_at: Utc::now(),
        };
        // Clones the spine only if a snapshot still shares it.
        Arc::make_mut(&mut self.messages).push(Arc::new(message));
        index
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Look up a message by sequence index.
    pub fn get(&self, index: u64) -> Option<&SceneMessage> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.messages.get(i))
            .map(|m| m.as_ref())
    }

    /// A consistent view of every message appended so far.
    pub fn snapshot(&self) -> MessageSnapshot {
        MessageSnapshot {
            messages: Arc::clone(&self.messages),
            len: self.messages.len(),
        }
    }

    /// A view ending at (and including) sequence index `index`.
    pub fn snapshot_upto(&self, index: u64) -> Result<MessageSnapshot, StoreError> {
        let len = usize::try_from(index)
            .ok()
            .filter(|i| *i < self.messages.len())
            .ok_or(StoreError::UnknownIndex(index))?
            + 1;
        Ok(MessageSnapshot {
            messages: Arc::clone(&self.messages),
            len,
        })
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable, length-bounded view of a message store.
///
/// Cloning is cheap. Everything that selects or looks up messages for a
/// prompt reads from a snapshot, never from the live store.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    messages: Arc<Vec<Arc<SceneMessage>>>,
    len: usize,
}

impl MessageSnapshot {
    /// Snapshot of a throwaway store holding `drafts`.
    pub fn from_drafts(drafts: impl IntoIterator<Item = NewMessage>) -> Self {
        MessageStore::from_drafts(drafts).snapshot()
    }

    pub fn as_slice(&self) -> &[Arc<SceneMessage>] {
        &self.messages[..self.len]
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &SceneMessage> + ExactSizeIterator {
        self.as_slice().iter().map(|m| m.as_ref())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn last(&self) -> Option<&SceneMessage> {
        self.as_slice().last().map(|m| m.as_ref())
    }

    /// Number of dialogue-bearing messages in the view.
    pub fn dialogue_count(&self) -> usize {
        self.iter().filter(|m| m.is_dialogue()).count()
    }

    /// Distinct character names that have spoken in the view, in first-seen order.
    pub fn characters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for message in self.iter() {
            if message.kind != MessageKind::Character {
                continue;
            }
            if let Some(name) = message.speaker.as_deref() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// A message store shared between the engine (appending) and renderers
/// (snapshotting).
#[derive(Debug, Clone, Default)]
pub struct SharedMessageStore {
    inner: Arc<RwLock<MessageStore>>,
}

impl SharedMessageStore {
    pub fn new(store: MessageStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub async fn append(&self, draft: NewMessage) -> u64 {
        self.inner.write().await.append(draft)
    }

    /// Capture the current length-bounded view. The read lock is held only
    /// for the duration of an `Arc` clone.
    pub async fn snapshot(&self) -> MessageSnapshot {
        self.inner.read().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn scene_id(&self) -> SceneId {
        self.inner.read().await.scene_id().clone()
    }
}
