//! # Lab Co-Pilot
//!
//! An assistant backend for laboratory researchers: upload tabular data and
//! research documents, then analyze both through a tool-calling chat loop.
//!
//! This library provides:
//! - An HTTP API for chat, dataset operations, and document search
//! - A two-call agent loop (tool execution, then tool-free synthesis)
//! - A sandboxed script interpreter for custom analyses
//!
//! ## Architecture
//!
//! Each chat message runs a fixed loop:
//! 1. Build context with system prompt, dataset schema, and history window
//! 2. Call the model with tool schemas, execute any requested tool calls
//! 3. Feed the result envelopes back in a second, tool-free call
//! 4. Record exactly one assistant turn with text, chart, and table payloads
//!
//! ## Example
//!
//! ```rust,ignore
//! use lab_copilot::{api, config::Config};
//!
//! let config = Config::from_env()?;
//! api::serve(config).await?;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod data;
pub mod kb;
pub mod llm;
pub mod sandbox;
pub mod store;
pub mod tools;
