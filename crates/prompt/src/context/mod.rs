//! Budget-aware prompt assembly.
//!
//! | Stage | Module | Trim Strategy |
//! |-------|--------|---------------|
//! | Lookup | `lookup` | Bounded backward scan |
//! | History | `history` | Oldest dropped first, dialogue floor kept |
//! | Placement | `placement` | Guidance before/after history by length |
//! | Composition | `composer` | Fixed content first, memory capped, history gets the rest |

pub mod composer;
pub mod history;
pub mod lookup;
pub mod placement;

pub use composer::{
    HistoryStats, PromptComposer, RenderInput, RenderMetadata, RenderSignal, RenderedPrompt,
    SectionStats,
};
pub use history::{HistoryRequest, HistorySelection, HistorySelector, Insertion};
pub use lookup::{last_dialogue, last_director_for, last_of_type};
pub use placement::{PlacedGuidance, Placement, decide_placement, merge_guidance, place_guidance};
