//! Known source shapes answered without running the script.
//!
//! Detection is literal containment checked in a fixed order; the first
//! shape that matches wins. Not matching is a normal outcome.

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_NAME: &str = "Alice";
pub const JOKE: &str = "Why do programmers prefer dark mode? Because light attracts bugs!";
/// Shown while the joke request is in flight.
pub const LOADING: &str = "Fetching a joke...";

const GREET_SIGNATURE: &str = "const greet = (name: string): string";
const GREET_TEMPLATE: &str = "return `Hello, ${name}!`";
const GREET_NAME_BINDING: &str = "userName";
const JOKE_SIGNATURE: &str = "const tellJoke = (): string";
const JOKE_LINE: &str = "Why do programmers prefer dark mode?";
const FETCH_FUNCTION: &str = "fetchRandomJoke";
const FETCH_CALL: &str = "fetch";
const FETCH_SETUP: &str = "joke.setup";
const FETCH_PUNCHLINE: &str = "joke.punchline";

static TYPED_USER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"const\s+userName\s*:\s*[A-Za-z_$][\w$]*\s*=\s*["'](.+?)["']"#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizedPattern {
    /// Typed `greet` arrow plus a `userName` binding; answers `Hello, <name>!`.
    NameGreeting { name: String },
    JokeTeller,
    /// Fetch-based joke retrieval; answered with a real request to the joke endpoint.
    JokeFetch,
    NoMatch,
}

impl RecognizedPattern {
    /// Output available without any I/O. `JokeFetch` only has its
    /// loading placeholder.
    pub fn immediate_output(&self) -> Option<String> {
        match self {
            RecognizedPattern::NameGreeting { name } => Some(greeting(name)),
            RecognizedPattern::JokeTeller => Some(JOKE.to_string()),
            RecognizedPattern::JokeFetch => Some(LOADING.to_string()),
            RecognizedPattern::NoMatch => None,
        }
    }
}

pub fn greeting(name: &str) -> String {
    format!("Hello, {name}!")
}

pub fn recognize(src: &str) -> RecognizedPattern {
    if src.contains(GREET_SIGNATURE) && src.contains(GREET_TEMPLATE) && src.contains(GREET_NAME_BINDING) {
        let name = TYPED_USER_NAME
            .captures(src)
            .and_then(|c| c.get(1))
            .map_or(DEFAULT_NAME, |m| m.as_str());
        return RecognizedPattern::NameGreeting { name: name.to_string() };
    }

    if src.contains(JOKE_SIGNATURE) && src.contains(JOKE_LINE) {
        return RecognizedPattern::JokeTeller;
    }

    if [FETCH_FUNCTION, FETCH_CALL, FETCH_SETUP, FETCH_PUNCHLINE]
        .iter()
        .all(|marker| src.contains(marker))
    {
        return RecognizedPattern::JokeFetch;
    }

    RecognizedPattern::NoMatch
}
