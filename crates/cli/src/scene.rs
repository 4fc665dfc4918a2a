//! Scene files: everything a render needs, as JSON.
//!
//! ```json
//! {
//!   "context": "A harbor town at dusk.",
//!   "task": "Write Ava's next line.",
//!   "guidance": ["Ava is wary."],
//!   "memory": ["Ava hid the ledger."],
//!   "scaffolding": "Ava:",
//!   "acting_instruction": "(Ava should sound tired.)",
//!   "messages": [{ "kind": "character", "speaker": "Kai", "content": "Well?" }]
//! }
//! ```

use serde::Deserialize;
use std::path::Path;
use talewright_core::{MessageStore, NewMessage};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SceneFile {
    pub context: String,
    pub task: String,
    pub guidance: Vec<String>,
    pub memory: Vec<String>,
    pub scaffolding: String,
    pub acting_instruction: Option<String>,
    pub messages: Vec<NewMessage>,
}

impl SceneFile {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scene file {}: {e}", path.display()))?;
        let scene: SceneFile = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid scene file {}: {e}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            messages = scene.messages.len(),
            "Scene file loaded"
        );
        Ok(scene)
    }

    /// A store holding the scene's messages in file order.
    pub fn store(&self) -> MessageStore {
        MessageStore::from_drafts(self.messages.iter().cloned())
    }
}
