//! Core chat loop implementation.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::data::ChartSpec;
use crate::llm::{ChatMessage, LlmClient, Role, ToolCall};
use crate::store::{Session, Turn};
use crate::tools;

use super::prompt::build_system_prompt;

/// What one processed message produced. The text always carries something,
/// even when the provider or a tool failed.
#[derive(Debug)]
pub struct ChatOutcome {
    pub text: String,
    pub chart: Option<ChartSpec>,
    pub table_data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    pub table_columns: Option<Vec<String>>,
}

/// The chat orchestrator. One instance serves all requests; per-message
/// state lives in the session.
pub struct Agent {
    model: String,
    llm: Arc<dyn LlmClient>,
    sandbox_timeout_secs: u64,
    history_window: usize,
}

impl Agent {
    pub fn new(config: &Config, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            model: config.model.clone(),
            llm,
            sandbox_timeout_secs: config.sandbox_timeout_secs,
            history_window: config.history_window,
        }
    }

    /// Process one user message:
    /// 1. Send to the provider with tool schemas
    /// 2. Execute any requested tool calls
    /// 3. Ask for a tool-free final response
    /// 4. Record exactly one assistant turn
    pub async fn process_message(
        &self,
        session: &RwLock<Session>,
        user_message: &str,
    ) -> ChatOutcome {
        // Build the prompt and commit the user turn under one write lock.
        // The history window is taken before the new message is appended.
        let mut messages = {
            let mut session = session.write().await;
            let mut messages = vec![ChatMessage::system(build_system_prompt(&session))];
            for turn in session.snapshot(self.history_window) {
                messages.push(match turn.role {
                    crate::store::TurnRole::User => ChatMessage::user(turn.text.clone()),
                    crate::store::TurnRole::Assistant => ChatMessage::assistant(turn.text.clone()),
                });
            }
            messages.push(ChatMessage::user(user_message));
            session.append(Turn::user(user_message));
            messages
        };

        let mut outcome = ChatOutcome {
            text: String::new(),
            chart: None,
            table_data: None,
            table_columns: None,
        };

        let schemas = tools::schemas();
        let first = self
            .llm
            .chat_completion(&self.model, &messages, Some(&schemas))
            .await;

        match first {
            Ok(response) => match response.tool_calls {
                Some(tool_calls) if !tool_calls.is_empty() => {
                    messages.push(ChatMessage {
                        role: Role::Assistant,
                        content: response.content.clone(),
                        tool_calls: Some(tool_calls.clone()),
                        tool_call_id: None,
                        name: None,
                    });

                    for tool_call in &tool_calls {
                        let message = self.run_tool(session, tool_call, &mut outcome).await;
                        messages.push(message);
                    }

                    // Second call, no tools offered: synthesis only.
                    match self.llm.chat_completion(&self.model, &messages, None).await {
                        Ok(response) => outcome.text = response.content.unwrap_or_default(),
                        Err(e) => {
                            tracing::error!("second model call failed: {}", e);
                            outcome.text = format!("I encountered an error: {}", e);
                        }
                    }
                }
                _ => outcome.text = response.content.unwrap_or_default(),
            },
            Err(e) => {
                tracing::error!("first model call failed: {}", e);
                outcome.text = format!("I encountered an error: {}", e);
            }
        }

        session.write().await.append(Turn::assistant(
            outcome.text.clone(),
            outcome.chart.clone(),
            outcome.table_data.clone(),
            outcome.table_columns.clone(),
        ));

        outcome
    }

    /// Execute one tool call, fold its payloads into the outcome, and
    /// return the tool message for the second model call. Later envelopes
    /// overwrite earlier chart/table payloads.
    async fn run_tool(
        &self,
        session: &RwLock<Session>,
        tool_call: &ToolCall,
        outcome: &mut ChatOutcome,
    ) -> ChatMessage {
        let name = &tool_call.function.name;
        let args = tool_call.args();

        let envelope = {
            let session = session.read().await;
            tools::dispatch(name, &args, &session, self.sandbox_timeout_secs).await
        };

        if let Some(chart) = &envelope.chart {
            outcome.chart = Some(chart.clone());
        }
        if let Some(data) = &envelope.data {
            outcome.table_data = Some(data.clone());
            outcome.table_columns = Some(envelope.columns.clone().unwrap_or_default());
        }

        ChatMessage::tool_result(tool_call.id.clone(), name.clone(), envelope.to_content())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataFrame;
    use crate::llm::{ChatResponse, LlmError, ToolCallFunction};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted provider: pops one canned reply per call and records the
    /// messages it was sent.
    struct ScriptedLlm {
        replies: Mutex<Vec<Result<ChatResponse, LlmError>>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(mut replies: Vec<Result<ChatResponse, LlmError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: Option<&[serde_json::Value]>,
        ) -> Result<ChatResponse, LlmError> {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(ChatResponse { content: Some("done".to_string()), tool_calls: None }))
        }
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: args,
            },
        }
    }

    fn agent_with(llm: Arc<dyn LlmClient>) -> Agent {
        let config = Config::new("test-key".to_string(), "test-model".to_string());
        Agent::new(&config, llm)
    }

    fn loaded_session() -> RwLock<Session> {
        let mut session = Session::new();
        let frame = DataFrame::from_csv(
            b"gene,expression\nTP53,1.5\nBRCA1,2.5\nTP53,3.5\n",
            "genes.csv",
        )
        .expect("csv");
        session.insert_dataset("d1".to_string(), "genes.csv".to_string(), frame);
        RwLock::new(session)
    }

    #[tokio::test]
    async fn plain_reply_skips_tools_and_records_two_turns() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(ChatResponse {
            content: Some("Hello! Upload a dataset to get started.".to_string()),
            tool_calls: None,
        })]));
        let agent = agent_with(llm.clone());
        let session = RwLock::new(Session::new());

        let outcome = agent.process_message(&session, "hi").await;
        assert_eq!(outcome.text, "Hello! Upload a dataset to get started.");
        assert!(outcome.chart.is_none());

        let session = session.read().await;
        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "hi");
        assert_eq!(history[1].text, outcome.text);
        // Only the first model call happened.
        assert_eq!(llm.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tool_round_trip_feeds_envelope_to_second_call() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(ChatResponse {
                content: None,
                tool_calls: Some(vec![call(
                    "c1",
                    "aggregate_data",
                    json!({"group_column": "gene", "value_column": "expression", "agg_func": "mean"}),
                )]),
            }),
            Ok(ChatResponse {
                content: Some("TP53 averages 2.5.".to_string()),
                tool_calls: None,
            }),
        ]));
        let agent = agent_with(llm.clone());
        let session = loaded_session();

        let outcome = agent.process_message(&session, "mean expression per gene?").await;
        assert_eq!(outcome.text, "TP53 averages 2.5.");
        assert_eq!(outcome.table_data.as_ref().map(Vec::len), Some(2));

        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let second = &calls[1];
        let tool_message = second
            .iter()
            .find(|m| matches!(m.role, Role::Tool))
            .expect("tool message");
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_message.content.as_ref().unwrap().contains("row_count"));
    }

    #[tokio::test]
    async fn string_encoded_tool_arguments_are_decoded() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(ChatResponse {
                content: None,
                tool_calls: Some(vec![ToolCall {
                    id: "c1".to_string(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: "filter_data".to_string(),
                        // Providers may send the argument map JSON-encoded.
                        arguments: json!(r#"{"conditions": "expression > 2"}"#),
                    },
                }]),
            }),
            Ok(ChatResponse { content: Some("Two rows match.".to_string()), tool_calls: None }),
        ]));
        let agent = agent_with(llm.clone());
        let session = loaded_session();

        let outcome = agent.process_message(&session, "which exceed 2?").await;
        assert_eq!(outcome.table_data.as_ref().map(Vec::len), Some(2));

        let calls = llm.calls.lock().unwrap();
        let tool_message = calls[1]
            .iter()
            .find(|m| matches!(m.role, Role::Tool))
            .expect("tool message");
        assert!(tool_message.content.as_ref().unwrap().contains("\"row_count\":2"));
    }

    #[tokio::test]
    async fn second_chart_wins() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(ChatResponse {
                content: None,
                tool_calls: Some(vec![
                    call("c1", "generate_plot", json!({"plot_type": "bar", "x_column": "gene", "y_column": "expression"})),
                    call("c2", "generate_plot", json!({"plot_type": "scatter", "x_column": "gene", "y_column": "expression"})),
                ]),
            }),
            Ok(ChatResponse { content: Some("Here are two views.".to_string()), tool_calls: None }),
        ]));
        let agent = agent_with(llm);
        let session = loaded_session();

        let outcome = agent.process_message(&session, "plot it twice").await;
        assert_eq!(outcome.chart.expect("chart").plot_type, "scatter");
    }

    #[tokio::test]
    async fn tool_error_still_reaches_second_call() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(ChatResponse {
                content: None,
                tool_calls: Some(vec![call("c1", "filter_data", json!({"conditions": "x > 1"}))]),
            }),
            Ok(ChatResponse {
                content: Some("That column does not exist.".to_string()),
                tool_calls: None,
            }),
        ]));
        let agent = agent_with(llm.clone());
        // No dataset loaded, so the tool reports an error envelope.
        let session = RwLock::new(Session::new());

        let outcome = agent.process_message(&session, "filter by x").await;
        assert_eq!(outcome.text, "That column does not exist.");

        let calls = llm.calls.lock().unwrap();
        let tool_message = calls[1]
            .iter()
            .find(|m| matches!(m.role, Role::Tool))
            .expect("tool message");
        assert!(tool_message.content.as_ref().unwrap().contains("No dataset loaded."));
    }

    #[tokio::test]
    async fn provider_failure_becomes_apologetic_text() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Api {
            status: 500,
            body: "upstream exploded".to_string(),
        })]));
        let agent = agent_with(llm.clone());
        let session = RwLock::new(Session::new());

        let outcome = agent.process_message(&session, "hello?").await;
        assert!(outcome.text.starts_with("I encountered an error:"));

        // The failed turn is still recorded; no second call was made.
        let session = session.read().await;
        assert_eq!(session.history().len(), 2);
        assert_eq!(llm.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_window_and_user_turn_order() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(ChatResponse {
            content: Some("ok".to_string()),
            tool_calls: None,
        })]));
        let agent = agent_with(llm.clone());
        let session = RwLock::new(Session::new());
        {
            let mut s = session.write().await;
            for i in 0..30 {
                s.append(Turn::user(format!("old message {}", i)));
            }
        }

        agent.process_message(&session, "newest").await;

        let calls = llm.calls.lock().unwrap();
        let messages = &calls[0];
        // System prompt + 20-turn window + the new user message.
        assert_eq!(messages.len(), 22);
        assert_eq!(messages[1].content.as_deref(), Some("old message 10"));
        assert_eq!(messages.last().unwrap().content.as_deref(), Some("newest"));
    }
}
