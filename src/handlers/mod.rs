// src/handlers/mod.rs

pub mod assessment;
pub mod certificate;
pub mod health;
