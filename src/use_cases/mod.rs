// Use cases layer: application workflows for the match server.

pub mod identity;
pub mod lobby;
pub mod match_engine;
pub mod types;
