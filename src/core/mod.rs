//! Resolution logic - pure computation with no direct I/O.
//!
//! Contains the record `classifier`, the delegation `walker`, the per-lookup
//! `resolution` state machine and the `background` query bookkeeping.
//! All collaborator orchestration lives in `registry/`, which calls into this module.

pub(crate) mod background;
pub(crate) mod classifier;
pub(crate) mod resolution;
pub(crate) mod walker;
