//! System-instruction prompt files, loaded by name at startup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::RagError;

/// Returns system instruction text given a prompt name.
#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: PathBuf,
    cache: HashMap<String, String>,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    /// Load a prompt by name, trying `<name>`, `<name>.md`, `<name>.txt`.
    /// A missing prompt is a startup error, not a per-query one.
    pub fn load(&mut self, name: &str) -> Result<&str, RagError> {
        if !self.cache.contains_key(name) {
            let text = read_prompt(&self.dir, name)?;
            self.cache.insert(name.to_string(), text);
        }
        Ok(self.cache.get(name).map(|s| s.as_str()).unwrap_or_default())
    }
}

fn read_prompt(dir: &Path, name: &str) -> Result<String, RagError> {
    let candidates = [
        dir.join(name),
        dir.join(format!("{}.md", name)),
        dir.join(format!("{}.txt", name)),
    ];
    for path in &candidates {
        if path.is_file() {
            return fs::read_to_string(path).map_err(|e| {
                RagError::Config(format!("failed to read prompt {}: {}", path.display(), e))
            });
        }
    }
    Err(RagError::Config(format!(
        "prompt '{}' not found under {}",
        name,
        dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_by_name_with_extension_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("assistant.md"), "You are a helpful agent.").unwrap();

        let mut store = PromptStore::new(dir.path());
        assert_eq!(store.load("assistant").unwrap(), "You are a helpful agent.");
        // Second load hits the cache even if the file disappears.
        fs::remove_file(dir.path().join("assistant.md")).unwrap();
        assert_eq!(store.load("assistant").unwrap(), "You are a helpful agent.");
    }

    #[test]
    fn missing_prompt_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PromptStore::new(dir.path());
        assert!(store.load("nope").is_err());
    }
}
