//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TargetState`: Lifecycle of a single crawl target (pending, dispatched, finished)
//! - `OriginPacer`: Per-origin politeness pacing shared by all workers

mod origin_state;
mod target_state;

// Re-export main types
pub use origin_state::{OriginPacer, OriginState};
pub use target_state::TargetState;
