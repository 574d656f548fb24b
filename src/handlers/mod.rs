// src/handlers/mod.rs

pub mod admin;
pub mod assessments;
pub mod attempts;
pub mod scopes;
