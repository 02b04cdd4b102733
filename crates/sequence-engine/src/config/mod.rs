//! Configuration module for the sequence engine.
//!
//! Configuration is loaded from environment variables using the `envy`
//! crate for type-safe environment variable parsing.

mod engine;

pub use engine::EngineConfig;
