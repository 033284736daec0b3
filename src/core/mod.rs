// src/core/mod.rs
//
// The quiz core: cloze template compilation/validation at authoring time,
// and the timed attempt engine at play time. Everything here is framework
// free; storage is reached only through the ports module.

pub mod engine;
pub mod ports;
pub mod session;
pub mod template;
