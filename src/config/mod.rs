//! Configuration module for Reelcast.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, QueryPrompts, ScriptPrompts};
pub use settings::{
    GeneralSettings, NarrationSettings, PromptSettings, RenderSettings, ScriptSettings,
    SegmenterSettings, Settings, VisualSettings, IMAGES_PER_SEGMENT_RANGE,
};
