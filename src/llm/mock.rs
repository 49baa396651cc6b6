//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on which call is being made
//! (intent classification, general answer or SQL generation) and on
//! patterns in the user message.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, SageError};
use crate::llm::types::{last_user_message, system_prompt, Message};
use crate::llm::LlmClient;
use crate::prompt::{GENERAL_SYSTEM_PROMPT, INTENT_SYSTEM_PROMPT};

/// Words that make the default intent heuristic answer "true".
const DATA_WORDS: &[&str] = &[
    "show", "list", "count", "how many", "find", "which", "get", "total", "average", "all",
];

/// Mock LLM client that returns canned responses.
///
/// Used for unit testing without making real API calls.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    /// SQL-generation replies keyed by a pattern in the question.
    sql_responses: Vec<(String, String)>,
    /// Fixed intent answer; when unset a keyword heuristic decides.
    intent: Option<bool>,
    /// Fixed general answer.
    general_answer: Option<String>,
    /// Makes every call fail with this message.
    fail_with: Option<String>,
    /// Every request received, in order.
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a SQL-generation reply.
    ///
    /// When the question contains `pattern` (case-insensitive), the mock
    /// returns `response` verbatim, noise and fences included.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.sql_responses
            .push((pattern.into().to_lowercase(), response.into()));
        self
    }

    /// Fixes the intent-classification answer.
    pub fn with_intent(mut self, needs_data: bool) -> Self {
        self.intent = Some(needs_data);
        self
    }

    /// Fixes the general-answer reply.
    pub fn with_general_answer(mut self, answer: impl Into<String>) -> Self {
        self.general_answer = Some(answer.into());
        self
    }

    /// Makes every completion fail.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Returns the number of completions requested.
    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns every request received, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn intent_response(&self, question: &str) -> String {
        let needs_data = self.intent.unwrap_or_else(|| {
            let lowered = question.to_lowercase();
            DATA_WORDS.iter().any(|w| lowered.contains(w))
        });
        needs_data.to_string()
    }

    fn general_response(&self, question: &str) -> String {
        self.general_answer
            .clone()
            .unwrap_or_else(|| format!("Mock answer to: {}", question))
    }

    fn sql_response(&self, system: &str, question: &str) -> String {
        let lowered = question.to_lowercase();
        if let Some((_, response)) = self
            .sql_responses
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern.as_str()))
        {
            return response.clone();
        }

        // Select from the first table the prompt describes.
        system
            .lines()
            .find_map(|line| line.strip_prefix("Table: "))
            .map(|table| format!("SELECT * FROM {};", table.trim()))
            .unwrap_or_else(|| "SELECT 1;".to_string())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        if let Some(message) = &self.fail_with {
            return Err(SageError::llm(message.clone()));
        }

        let system = system_prompt(messages).unwrap_or_default();
        let question = last_user_message(messages).unwrap_or_default();

        Ok(match system {
            INTENT_SYSTEM_PROMPT => self.intent_response(question),
            GENERAL_SYSTEM_PROMPT => self.general_response(question),
            _ => self.sql_response(system, question),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{general_messages, intent_messages};

    fn sql_request(system: &str, question: &str) -> Vec<Message> {
        vec![Message::system(system), Message::user(question)]
    }

    #[tokio::test]
    async fn test_intent_heuristic() {
        let client = MockLlmClient::new();
        let yes = client
            .complete(&intent_messages("How many orders shipped?"))
            .await
            .unwrap();
        assert_eq!(yes, "true");

        let no = client
            .complete(&intent_messages("What does a LEFT JOIN do?"))
            .await
            .unwrap();
        assert_eq!(no, "false");
    }

    #[tokio::test]
    async fn test_intent_override() {
        let client = MockLlmClient::new().with_intent(false);
        let answer = client
            .complete(&intent_messages("show all orders"))
            .await
            .unwrap();
        assert_eq!(answer, "false");
    }

    #[tokio::test]
    async fn test_general_answer() {
        let client = MockLlmClient::new().with_general_answer("An index speeds up lookups.");
        let answer = client
            .complete(&general_messages("what is an index"))
            .await
            .unwrap();
        assert_eq!(answer, "An index speeds up lookups.");
    }

    #[tokio::test]
    async fn test_sql_defaults_to_first_prompt_table() {
        let client = MockLlmClient::new();
        let system = "preamble\n\nDatabase Schema:\n\nTable: receipts\nColumns:\n- id: INTEGER NULL";
        let sql = client.complete(&sql_request(system, "anything")).await.unwrap();
        assert_eq!(sql, "SELECT * FROM receipts;");

        let fallback = client.complete(&sql_request("no tables", "x")).await.unwrap();
        assert_eq!(fallback, "SELECT 1;");
    }

    #[tokio::test]
    async fn test_custom_sql_response() {
        let client = MockLlmClient::new()
            .with_response("us-east", "```sql\nSELECT * FROM lb WHERE location = 'us-east';\n```");
        let reply = client
            .complete(&sql_request("Table: lb", "Balancers in US-EAST"))
            .await
            .unwrap();
        assert!(reply.starts_with("```sql"));
    }

    #[tokio::test]
    async fn test_requests_are_recorded_and_failures_surface() {
        let client = MockLlmClient::new().failing("quota exceeded");
        let err = client.complete(&intent_messages("hi")).await.unwrap_err();
        assert!(matches!(err, SageError::Llm(_)));
        assert_eq!(client.call_count(), 1);
        assert_eq!(client.requests()[0][1], Message::user("hi"));
    }
}
