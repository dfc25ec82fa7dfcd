use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{PromptBackend, PromptError};

#[derive(Debug, Deserialize)]
struct PromptFile {
    template: Option<String>,
}

/// Reads prompts from `<dir>/<name>.yml`, each holding a `template` key.
pub struct YamlPromptBackend {
    prompt_dir: PathBuf,
}

impl YamlPromptBackend {
    pub fn new<P: AsRef<Path>>(prompt_dir: P) -> Self {
        Self {
            prompt_dir: prompt_dir.as_ref().to_path_buf(),
        }
    }
}

impl PromptBackend for YamlPromptBackend {
    fn get(&self, name: &str, _user_id: Option<&str>) -> Result<String, PromptError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(PromptError::NotFound(name.to_string()));
        }

        let path = self.prompt_dir.join(format!("{}.yml", name));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PromptError::NotFound(name.to_string()))
            }
            Err(e) => return Err(PromptError::ReadFile { path, source: e }),
        };

        let file: PromptFile = serde_yaml::from_str(&content)
            .map_err(|e| PromptError::ParseYaml { path, source: e })?;

        file.template
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PromptError::MissingTemplate {
                name: name.to_string(),
            })
    }
}
