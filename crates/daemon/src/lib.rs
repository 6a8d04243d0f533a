//! Verification daemon: HTTP surface, live collaborator wiring and
//! file-backed stores around the orchestration engine.

pub mod advice;
pub mod api;
pub mod config;
pub mod live;
pub mod state;
pub mod stores;
