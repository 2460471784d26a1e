//! Agent module - the chat orchestration logic.
//!
//! Each message runs a fixed two-call loop:
//! 1. Build context with system prompt, history window, and user message
//! 2. Call the model with tool schemas
//! 3. Execute any requested tool calls and feed the envelopes back
//! 4. Call the model once more, tool-free, for the final answer

mod agent_loop;
mod prompt;

pub use agent_loop::{Agent, ChatOutcome};
pub use prompt::build_system_prompt;
