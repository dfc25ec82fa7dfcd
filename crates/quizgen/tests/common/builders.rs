//! Builders for configuration documents.

#![allow(dead_code)]

use serde_json::{json, Value};

/// Builds a config JSON document, starting from the smallest valid one.
pub struct ConfigBuilder {
    value: Value,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            value: json!({
                "version": "1.0",
                "document_directory": "/tmp/quizgen/documents",
                "model": { "provider": "gemini" }
            }),
        }
    }

    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.value[key] = value;
        self
    }

    pub fn database_path(self, path: &str) -> Self {
        self.set("database_path", json!(path))
    }

    pub fn document_directory(self, dir: &str) -> Self {
        self.set("document_directory", json!(dir))
    }

    pub fn worker_count(self, count: usize) -> Self {
        self.set("worker_count", json!(count))
    }

    pub fn retry(self, max_attempts: u32, base_delay_secs: u64) -> Self {
        self.set(
            "retry",
            json!({ "max_attempts": max_attempts, "base_delay_secs": base_delay_secs }),
        )
    }

    pub fn generation(self, questions_per_topic: u32, start_index: u32) -> Self {
        self.set(
            "generation",
            json!({ "questions_per_topic": questions_per_topic, "start_index": start_index }),
        )
    }

    pub fn model(self, model: Value) -> Self {
        self.set("model", model)
    }

    pub fn build(&self) -> String {
        serde_json::to_string_pretty(&self.value).unwrap()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
