//! quizroom: server for live, PIN-joined multiplayer quiz games.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! drive them directly.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod subsystems;
