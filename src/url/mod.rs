//! URL handling module for Sumi-Gather
//!
//! This module resolves raw references into absolute URLs, classifies them as
//! artifacts or pages, derives origin keys for pacing, and builds labels and
//! file names from URL paths.

mod classify;
mod label;
mod normalize;
mod origin;

// Re-export main functions
pub use classify::{classify, extension_of, is_markup_extension, ArtifactRules, ResourceKind};
pub use label::{
    artifact_file_name, collapse_whitespace, placeholder_label, sanitize_component,
    UNTITLED_LABEL,
};
pub use normalize::{link_key, normalize_absolute, normalize_url};
pub use origin::origin_key;
