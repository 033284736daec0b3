// src/handlers/mod.rs

pub mod attempt;
pub mod auth;
pub mod class;
pub mod game;
pub mod play;
