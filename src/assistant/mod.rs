//! Code assistant: relays prompts to an OpenAI-compatible Chat Completions
//! endpoint and falls back to canned replies when that is not possible.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{cache::ResponseCache, config::Config};

/// System message used when the caller gives no context.
pub const DEFAULT_CONTEXT: &str = "You are a TypeScript code generator. Focus primarily on providing a SINGLE code example with minimal explanation. Always wrap code in triple backticks with typescript language identifier. Be concise and provide only one working code block per response.";

const GREETING_REPLY: &str = "Hello! How can I help you with your TypeScript code today?";
const FUNCTION_REPLY: &str = "I can help with TypeScript functions! Here's a simple example:\n\n```typescript\nconst greet = (name: string): string => {\n  return `Hello, ${name}!`;\n};\n\nconst userName: string = \"Alice\";\nconsole.log(greet(userName));\n```\n\nThis function takes a string parameter and returns a greeting message.";
const JOKE_REPLY: &str = "Here's a programming joke:\n\nWhy do programmers prefer dark mode?\n\nBecause light attracts bugs!\n\nWant me to make a simple function about this?\n\n```typescript\nconst tellJoke = (): string => {\n  return \"Why do programmers prefer dark mode? Because light attracts bugs!\";\n};\n\nconsole.log(tellJoke());\n```";
const CLASS_REPLY: &str = "Here's an example of a TypeScript class and interface:\n\n```typescript\ninterface Vehicle {\n  make: string;\n  model: string;\n  year: number;\n  start(): void;\n}\n\nclass Car implements Vehicle {\n  make: string;\n  model: string;\n  year: number;\n  private _isRunning: boolean = false;\n  \n  constructor(make: string, model: string, year: number) {\n    this.make = make;\n    this.model = model;\n    this.year = year;\n  }\n  \n  start(): void {\n    this._isRunning = true;\n    console.log(`The ${this.make} ${this.model} is now running.`);\n  }\n  \n  stop(): void {\n    this._isRunning = false;\n    console.log(`The ${this.make} ${this.model} has stopped.`);\n  }\n}\n\nconst myCar = new Car(\"Toyota\", \"Corolla\", 2020);\nmyCar.start();\nmyCar.stop();\n```";
const HELP_REPLY: &str = "I can help you with TypeScript code! Try asking for examples of functions, classes, interfaces, or other TypeScript concepts. Or I can explain how specific features work.";

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:typescript|ts)?\n([\s\S]*?)\n```").unwrap());

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Where a reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Cache,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

impl Reply {
    /// Last code block of the reply, if any.
    pub fn code(&self) -> Option<String> {
        extract_code_block(&self.text)
    }
}

#[derive(Debug)]
pub struct Assistant {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    cache: Option<ResponseCache>,
}

impl Assistant {
    pub fn from_config(cfg: &Config, model: Option<&str>) -> Result<Self> {
        let timeout = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(60);
        let api_base_url = cfg.get("API_BASE_URL").unwrap_or_else(|| "default".into());
        let model = model
            .map(str::to_string)
            .or_else(|| cfg.get("DEFAULT_MODEL"))
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&api_base_url),
            api_key: cfg.get("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            model,
            temperature: cfg.get_f32("ASSISTANT_TEMPERATURE").unwrap_or(0.7),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Asks the model; any failure is answered with a canned reply instead.
    pub async fn generate(&self, prompt: &str, context: Option<&str>) -> Reply {
        let context = context.filter(|c| !c.trim().is_empty()).unwrap_or(DEFAULT_CONTEXT);
        let key = self
            .cache
            .as_ref()
            .map(|cache| cache.key_for(&self.base_url, &self.model, prompt, context));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(text) = cache.get(key) {
                debug!(%key, "assistant reply from cache");
                return Reply { text, source: ReplySource::Cache };
            }
        }

        match self.complete(prompt, context).await {
            Ok(text) => {
                if let (Some(cache), Some(key)) = (&self.cache, &key) {
                    if let Err(e) = cache.set(key, &text) {
                        warn!(error = %format!("{e:#}"), "failed to cache assistant reply");
                    }
                }
                Reply { text, source: ReplySource::Model }
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "assistant unavailable, using fallback reply");
                Reply { text: fallback_reply(prompt).to_string(), source: ReplySource::Fallback }
            }
        }
    }

    async fn complete(&self, prompt: &str, context: &str) -> Result<String> {
        let Some(key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY is not set");
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

        let messages = vec![ChatMessage::new(Role::System, context), ChatMessage::new(Role::User, prompt)];
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("failed to send chat request")?;
        if !resp.status().is_success() {
            bail!("LLM error: {}", resp.status());
        }

        let completion: Completion = resp.json().await.context("failed to decode chat response")?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(anyhow!("empty chat response"));
        }
        Ok(text)
    }
}

fn normalize_base_url(api_base_url: &str) -> String {
    let base_url = if api_base_url == "default" { "https://api.openai.com/v1" } else { api_base_url };
    let trimmed = base_url.trim_end_matches('/');
    if !trimmed.ends_with("/v1") && !trimmed.contains("/v1/") {
        format!("{}/v1", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Canned reply picked by keyword, first match wins.
pub fn fallback_reply(prompt: &str) -> &'static str {
    let lower = prompt.to_lowercase();
    if lower.contains("hello") || lower.contains("hi") {
        GREETING_REPLY
    } else if lower.contains("help") && lower.contains("function") {
        FUNCTION_REPLY
    } else if lower.contains("tell") && lower.contains("joke") {
        JOKE_REPLY
    } else if lower.contains("class") || lower.contains("interface") {
        CLASS_REPLY
    } else {
        HELP_REPLY
    }
}

/// Body of the last ```` ``` ```` block tagged `typescript`, `ts` or untagged.
pub fn extract_code_block(reply: &str) -> Option<String> {
    CODE_BLOCK
        .captures_iter(reply)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_version_suffix() {
        assert_eq!(normalize_base_url("default"), "https://api.openai.com/v1");
        assert_eq!(normalize_base_url("http://localhost:3000/"), "http://localhost:3000/v1");
        assert_eq!(normalize_base_url("http://proxy/v1/"), "http://proxy/v1");
    }

    #[test]
    fn fallback_order() {
        assert_eq!(fallback_reply("Hello there"), GREETING_REPLY);
        assert_eq!(fallback_reply("HELP me write a FUNCTION"), FUNCTION_REPLY);
        assert_eq!(fallback_reply("tell me a joke"), JOKE_REPLY);
        assert_eq!(fallback_reply("show an interface"), CLASS_REPLY);
        assert_eq!(fallback_reply("generics?"), HELP_REPLY);
    }

    #[test]
    fn fallback_code_runs_through_recognizer() {
        let code = extract_code_block(FUNCTION_REPLY).unwrap();
        assert_eq!(
            crate::recognizer::recognize(&code),
            crate::recognizer::RecognizedPattern::NameGreeting { name: "Alice".into() }
        );
    }

    #[test]
    fn last_code_block_wins() {
        let reply = "```ts\nlet a = 1;\n```\ntext\n```\nlet b = 2;\n```\n```python\nx = 1\n```";
        assert_eq!(extract_code_block(reply).as_deref(), Some("let b = 2;"));
        assert_eq!(extract_code_block("no code"), None);
    }
}
