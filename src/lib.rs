//! Compass: coaching-chat backend with a persona simulator.
//!
//! The production path is one chat endpoint where users talk to an AI
//! coach. The simulator drives synthetic personas through the same
//! coaching logic so operators can exercise and evaluate conversations
//! offline: runs move `pending -> running -> completed | failed`, every
//! turn appends to a persisted transcript, and ended runs get a
//! card-worthiness verdict.

pub mod coach;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod profile;
pub mod sim;

pub use error::{Error, Result};
