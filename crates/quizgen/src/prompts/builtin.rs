use super::{PromptBackend, PromptError, QUIZ_GENERATION, TOPIC_EXTRACTION};

const TOPIC_EXTRACTION_TEMPLATE: &str = r#"You are given a study document.
Identify the main topics it covers, in the order they appear.
Return ONLY a JSON array of short topic titles, for example:
["Cell structure", "Mitosis", "Meiosis"]
Return [] if the document has no teachable content."#;

const QUIZ_GENERATION_TEMPLATE: &str = r#"Using only the attached document, write {{ count }} multiple-choice questions about the topic "{{ topic }}".
Number the questions starting at {{ start_index }}.
Return ONLY a JSON object of this shape:
{"topic": "...", "questions": [{"number": 1, "question": "...", "options": ["A", "B", "C", "D"], "answer": "A", "explanation": "..."}]}"#;

/// Compiled-in default prompts.
pub struct BuiltinPromptBackend;

impl PromptBackend for BuiltinPromptBackend {
    fn get(&self, name: &str, _user_id: Option<&str>) -> Result<String, PromptError> {
        match name {
            TOPIC_EXTRACTION => Ok(TOPIC_EXTRACTION_TEMPLATE.to_string()),
            QUIZ_GENERATION => Ok(QUIZ_GENERATION_TEMPLATE.to_string()),
            other => Err(PromptError::NotFound(other.to_string())),
        }
    }
}
