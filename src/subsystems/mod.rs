//! Server subsystems: persistence, scoring, live rooms, quiz drafting and
//! the HTTP channel, plus the shared component runtime.

pub mod comms;
pub mod hub;
pub mod quizgen;
pub mod runtime;
pub mod scoring;
pub mod store;
