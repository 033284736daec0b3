// src/models/mod.rs

pub mod attempt;
pub mod class;
pub mod game;
pub mod question;
pub mod user;
