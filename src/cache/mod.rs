//! On-disk cache of assistant replies.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct ResponseCache {
    length: usize,
    cache_path: PathBuf,
}

impl ResponseCache {
    pub fn new(cache_path: impl Into<PathBuf>, length: usize) -> Self {
        let cache_path = cache_path.into();
        let _ = fs::create_dir_all(&cache_path);
        Self { length, cache_path }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let len = cfg.get_usize("CACHE_LENGTH").unwrap_or(100);
        Self::new(cfg.cache_path(), len)
    }

    pub fn key_for(&self, base_url: &str, model: &str, prompt: &str, context: &str) -> String {
        let payload = serde_json::json!({
            "base_url": base_url,
            "model": model,
            "prompt": prompt,
            "context": context,
        });
        let data = serde_json::to_vec(&payload).unwrap_or_default();
        format!("{:x}", md5::compute(data))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.cache_path.join(key)).ok()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let p = self.cache_path.join(key);
        fs::create_dir_all(&self.cache_path)
            .with_context(|| format!("failed to create {}", self.cache_path.display()))?;
        fs::write(&p, value).with_context(|| format!("failed to write {}", p.display()))?;
        self.prune()
    }

    /// Keeps the `length` most recently written entries.
    fn prune(&self) -> Result<()> {
        let mut entries: Vec<_> = fs::read_dir(&self.cache_path)?.filter_map(|e| e.ok()).collect();
        if entries.len() <= self.length {
            return Ok(());
        }
        entries.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
        let over = entries.len() - self.length;
        for entry in entries.iter().take(over) {
            let _ = fs::remove_file(entry.path());
        }
        Ok(())
    }
}
