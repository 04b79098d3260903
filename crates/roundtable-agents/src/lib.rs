//! Roundtable: multi-model trivia debates.
//!
//! This crate wires the debate engine in `coordination` to real model
//! providers and a question file:
//!
//! - [`config`]: `roundtable.toml` and provider credentials from the environment
//! - [`backends`]: OpenAI and Gemini HTTP backends
//! - [`driver`]: one isolated debate per question, results written as JSON
//! - [`evaluate`]: accuracy report for a results file against grader labels

pub mod backends;
pub mod config;
pub mod driver;
pub mod evaluate;
