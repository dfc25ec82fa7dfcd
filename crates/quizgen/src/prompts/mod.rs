//! Prompt templates.
//!
//! Templates are looked up by name across an ordered list of backends. The
//! first backend that knows the name wins, so a YAML directory can override
//! the compiled-in defaults one prompt at a time.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub mod builtin;
pub mod yaml;

pub use builtin::BuiltinPromptBackend;
pub use yaml::YamlPromptBackend;

/// Prompt used to derive the topic list from a document.
pub const TOPIC_EXTRACTION: &str = "topic_extraction";
/// Prompt used to generate the quiz for one topic.
pub const QUIZ_GENERATION: &str = "quiz_generation";

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt '{0}' not found")]
    NotFound(String),

    #[error("Failed to read prompt file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid prompt file '{path}': {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Prompt '{name}' has no template")]
    MissingTemplate { name: String },

    #[error("Prompt placeholder '{{{{ {0} }}}}' has no value")]
    MissingVariable(String),
}

/// A source of prompt templates.
pub trait PromptBackend: Send + Sync {
    /// Returns the template called `name`. `user_id` is reserved for
    /// per-user overrides; backends may ignore it.
    fn get(&self, name: &str, user_id: Option<&str>) -> Result<String, PromptError>;
}

/// Ordered chain of prompt backends.
pub struct PromptStore {
    backends: Vec<Box<dyn PromptBackend>>,
}

impl PromptStore {
    /// YAML overrides from `prompt_dir` (when given), then the built-ins.
    pub fn new(prompt_dir: Option<PathBuf>) -> Self {
        let mut backends: Vec<Box<dyn PromptBackend>> = Vec::new();
        if let Some(dir) = prompt_dir {
            log::info!("Loading prompt overrides from {}", dir.display());
            backends.push(Box::new(YamlPromptBackend::new(dir)));
        }
        backends.push(Box::new(BuiltinPromptBackend));
        Self { backends }
    }

    pub fn with_backends(backends: Vec<Box<dyn PromptBackend>>) -> Self {
        Self { backends }
    }

    pub fn get(&self, name: &str, user_id: Option<&str>) -> Result<String, PromptError> {
        for backend in &self.backends {
            match backend.get(name, user_id) {
                Err(PromptError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(PromptError::NotFound(name.to_string()))
    }

    /// Looks up `name` and fills in its placeholders.
    pub fn render_named(
        &self,
        name: &str,
        user_id: Option<&str>,
        vars: &[(&str, String)],
    ) -> Result<String, PromptError> {
        let template = self.get(name, user_id)?;
        render(&template, vars)
    }
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Replaces every `{{ name }}` in `template` with its value from `vars`.
/// A placeholder without a value is an error.
pub fn render(template: &str, vars: &[(&str, String)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in RE_PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = vars
            .iter()
            .find(|(key, _)| *key == name.as_str())
            .map(|(_, value)| value)
            .ok_or_else(|| PromptError::MissingVariable(name.as_str().to_string()))?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}
