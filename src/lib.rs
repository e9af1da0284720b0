//! aitestgen - Generate API test suites from OpenAPI-style specifications
//!
//! Renders versioned prompt templates against a normalized spec, asks an LLM
//! provider (OpenAI, Anthropic, Gemini, OpenAI-compatible) for pytest code per
//! test category, sanitizes the reply, and annotates each suite with syntax,
//! endpoint-coverage and security findings.

pub mod cli;
pub mod config;
pub mod generator;
pub mod llm;
pub mod orchestrator;
pub mod postprocess;
pub mod prompt;
pub mod spec;
pub mod util;
