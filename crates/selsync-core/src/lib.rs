//! selsync-core: selection synchronization between a results table and a
//! named-region list.
//!
//! Provides the label codec, counterpart resolution in both directions and
//! the `SelectionBridge` that applies a newly observed selection to the other
//! collection. Host collaborators are traits in [`host`]; [`memory`] has
//! in-process implementations. Polling lives in `selsync-watch`.

pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod label;
pub mod memory;
pub mod resolve;
