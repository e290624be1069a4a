//! Gateway request handlers, grouped by API area.

pub mod chat;
pub mod personas;
pub mod runs;
