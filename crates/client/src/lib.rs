//! Room client for Chad Meet.
//!
//! Everything media-related goes through the traits in [`sdk`]; the rest of
//! the crate is the glue a meeting page needs on top: tile reconciliation,
//! chat over the data channel, device toggles, joining and the event loop.

pub mod chat;
pub mod connection;
pub mod controls;
pub mod reconcile;
pub mod replay;
pub mod room;
pub mod sdk;
pub mod token;
