//! Prompt construction for Sage.
//!
//! Renders the SQL-generation system prompt from the ranked tables, and
//! holds the fixed prompts for intent classification and general answers.

use crate::llm::Message;
use crate::schema::SchemaSnapshot;

/// Opening line of the SQL-generation prompt.
pub const ROLE_PREAMBLE: &str =
    "You are a SQL expert assistant. You have access to the following database schema:";

/// System prompt for deciding whether a question needs a query.
pub const INTENT_SYSTEM_PROMPT: &str = "You are a classifier that determines if a question requires SQL query execution. \
Respond with 'true' if the question needs SQL execution, 'false' otherwise.";

/// System prompt for questions answered without touching the database.
pub const GENERAL_SYSTEM_PROMPT: &str = "You are a helpful SQL assistant. \
Answer questions about SQL and databases in a clear, concise way.";

/// Output contract for SQL generation.
pub const SQL_INSTRUCTIONS: &str = r#"IMPORTANT: You must respond with ONLY a valid SQL SELECT query. Do not include any explanations, markdown formatting, or other text.

Rules:
1. The response must be a single SQL SELECT query
2. The query must start with SELECT and end with a semicolon
3. Only use tables and columns that exist in the schema above
4. Do not include any text before or after the query
5. Do not use markdown code blocks or backticks
6. Compare string literals in WHERE clauses case-insensitively, using COLLATE NOCASE (for example: WHERE location COLLATE NOCASE = 'us-east')

Example of correct response:
SELECT name FROM customers WHERE id = 1;

Examples of incorrect responses:
Here's the query: SELECT name FROM customers WHERE id = 1;
```sql
SELECT name FROM customers WHERE id = 1;
```"#;

/// Renders the SQL-generation system prompt.
///
/// Tables appear in `ranked` order. Names missing from `schema` are skipped.
pub fn build_system_prompt(ranked: &[String], schema: &SchemaSnapshot) -> String {
    let records: Vec<_> = ranked.iter().filter_map(|name| schema.get(name)).collect();

    let mut sections = vec![ROLE_PREAMBLE.to_string()];

    let mut schema_section = String::from("Database Schema:\n");
    for record in &records {
        schema_section.push('\n');
        schema_section.push_str(&record.format_columns());
        schema_section.push('\n');
    }
    sections.push(schema_section);

    let related: Vec<String> = records
        .iter()
        .filter(|r| !r.foreign_keys.is_empty())
        .map(|r| {
            let mut block = format!("{} relationships:", r.table_name);
            for fk in &r.foreign_keys {
                block.push_str("\n- ");
                block.push_str(&fk.describe());
            }
            block
        })
        .collect();
    if !related.is_empty() {
        sections.push(format!("Table Relationships:\n\n{}\n", related.join("\n\n")));
    }

    sections.push(SQL_INSTRUCTIONS.to_string());
    sections.join("\n\n")
}

/// Builds the messages for the SQL-generation call.
pub fn assemble(query: &str, ranked: &[String], schema: &SchemaSnapshot) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(ranked, schema)),
        Message::user(query),
    ]
}

/// Builds the messages for the intent-classification call.
pub fn intent_messages(question: &str) -> Vec<Message> {
    vec![
        Message::system(INTENT_SYSTEM_PROMPT),
        Message::user(question),
    ]
}

/// Builds the messages for a general, non-data answer.
pub fn general_messages(question: &str) -> Vec<Message> {
    vec![
        Message::system(GENERAL_SYSTEM_PROMPT),
        Message::user(question),
    ]
}
