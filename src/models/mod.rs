// src/models/mod.rs

pub mod attempt;
pub mod auto_test;
pub mod leaderboard;
pub mod question;
pub mod test_definition;
