//! Bounded tool-call loop shared by every provider adapter.
//!
//! ```text
//! AwaitingModel ──answer──▶ Answered
//!      │  ▲
//!  tools│  └──── ToolExecuted ◀── ToolRequested
//!      ▼                              ▲
//!  (cap reached) ──▶ Exhausted        │
//!      └──────────────────────────────┘
//! ```

use async_trait::async_trait;
use switchboard_types::ChatMessage;

use crate::application::ports::{
    provider::ProviderError,
    tools::{ToolBox, ToolCall},
};

/// Returned instead of looping forever when the model keeps asking for tools.
pub const EXHAUSTED_REPLY: &str =
    "Sorry, this request is taking too long to process. Please try again or simplify your question.";

/// One entry of the running conversation, in vendor-neutral form.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    Message(ChatMessage),
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

/// What the model produced for one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    Answer(String),
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// Submits the conversation to a vendor and decodes its answer.
#[async_trait]
pub trait TurnDriver: Send + Sync {
    async fn next_turn(&self, conversation: &[Turn]) -> Result<ModelTurn, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    AwaitingModel,
    ToolRequested {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
    ToolExecuted,
    Answered(String),
    Exhausted,
}

pub struct ToolLoop<'a> {
    tools: &'a ToolBox,
    max_rounds: u32,
}

impl<'a> ToolLoop<'a> {
    /// `max_rounds` bounds the number of model submissions.
    pub fn new(tools: &'a ToolBox, max_rounds: u32) -> Self {
        Self {
            tools,
            max_rounds: max_rounds.max(1),
        }
    }

    pub async fn run(
        &self,
        driver: &dyn TurnDriver,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut conversation: Vec<Turn> = history.iter().cloned().map(Turn::Message).collect();
        let mut submissions = 0u32;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    submissions += 1;
                    match driver.next_turn(&conversation).await? {
                        ModelTurn::Answer(reply) => LoopState::Answered(reply),
                        ModelTurn::ToolCalls { .. } if submissions >= self.max_rounds => {
                            LoopState::Exhausted
                        }
                        ModelTurn::ToolCalls { text, calls } => {
                            LoopState::ToolRequested { text, calls }
                        }
                    }
                }
                LoopState::ToolRequested { text, calls } => {
                    conversation.push(Turn::ToolCalls {
                        text,
                        calls: calls.clone(),
                    });
                    for call in calls {
                        tracing::debug!(tool = %call.name, round = submissions, "Executing tool call");
                        let content = self.tools.dispatch(&call).await;
                        conversation.push(Turn::ToolResult {
                            call_id: call.id,
                            name: call.name,
                            content,
                        });
                    }
                    LoopState::ToolExecuted
                }
                LoopState::ToolExecuted => LoopState::AwaitingModel,
                LoopState::Answered(reply) => return Ok(reply),
                LoopState::Exhausted => {
                    tracing::warn!(
                        max_rounds = self.max_rounds,
                        "Tool loop exhausted, returning fallback reply"
                    );
                    return Ok(EXHAUSTED_REPLY.to_string());
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::application::ports::tools::ToolKind;
    use crate::test_utils::{EchoTool, ScriptedTurns};

    fn search_call(id: &str, query: &str) -> ModelTurn {
        ModelTurn::ToolCalls {
            text: None,
            calls: vec![ToolCall {
                id: id.to_string(),
                name: "web_search".to_string(),
                arguments: json!({ "query": query }),
            }],
        }
    }

    #[tokio::test]
    async fn direct_answer_skips_tools() {
        let tool = Arc::new(EchoTool::new(ToolKind::WebSearch));
        let toolbox = ToolBox::new().with(tool.clone());
        let driver = ScriptedTurns::new(vec![ModelTurn::Answer("42".into())]);

        let reply = ToolLoop::new(&toolbox, 3)
            .run(&driver, &[ChatMessage::user("question")])
            .await
            .unwrap();

        assert_eq!(reply, "42");
        assert_eq!(tool.call_count(), 0);
        assert_eq!(driver.submissions().len(), 1);
    }

    #[tokio::test]
    async fn tool_result_is_fed_back_before_answer() {
        let tool = Arc::new(EchoTool::new(ToolKind::WebSearch));
        let toolbox = ToolBox::new().with(tool.clone());
        let driver = ScriptedTurns::new(vec![
            search_call("call_1", "rust release"),
            ModelTurn::Answer("Rust 1.90 is out".into()),
        ]);

        let reply = ToolLoop::new(&toolbox, 3)
            .run(&driver, &[ChatMessage::user("what's new in rust?")])
            .await
            .unwrap();

        assert_eq!(reply, "Rust 1.90 is out");
        assert_eq!(tool.call_count(), 1);

        let second = &driver.submissions()[1];
        assert_eq!(second.len(), 3);
        assert!(matches!(&second[1], Turn::ToolCalls { calls, .. } if calls[0].id == "call_1"));
        assert!(matches!(
            &second[2],
            Turn::ToolResult { call_id, content, .. }
                if call_id == "call_1" && content.contains("rust release")
        ));
    }

    #[tokio::test]
    async fn cap_yields_fallback_reply() {
        let tool = Arc::new(EchoTool::new(ToolKind::WebSearch));
        let toolbox = ToolBox::new().with(tool.clone());
        let driver = ScriptedTurns::repeating(search_call("loop", "again"));

        let reply = ToolLoop::new(&toolbox, 3)
            .run(&driver, &[ChatMessage::user("loop forever")])
            .await
            .unwrap();

        assert_eq!(reply, EXHAUSTED_REPLY);
        assert_eq!(driver.submissions().len(), 3);
        assert_eq!(tool.call_count(), 2);
    }

    #[tokio::test]
    async fn provider_errors_abort_the_loop() {
        let toolbox = ToolBox::new();
        let driver = ScriptedTurns::failing(ProviderError::RateLimited("slow".into()));

        let result = ToolLoop::new(&toolbox, 5)
            .run(&driver, &[ChatMessage::user("hi")])
            .await;

        assert_eq!(result, Err(ProviderError::RateLimited("slow".into())));
    }
}
