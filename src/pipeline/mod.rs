//! Upload pipeline stages.
//!
//! ```text
//! multipart ─► intake ─► retry(engine.convert) ─┬─► assemble ─► 200 JSON
//!                                               └─► classify ─► error JSON
//!                                                   (+ remove stored upload)
//! ```
//!
//! Each stage is a free function over plain data so it can be tested without
//! a server.

pub mod assemble;
pub mod classify;
pub mod intake;
pub mod retry;
