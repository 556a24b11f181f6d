use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use futures::{future::BoxFuture, FutureExt};
use tsplay::{
    config::ExecutionSettings,
    driver::{ErrorKind, ExecutionOutcome, RunState},
    network::{FetchCapability, FetchRequest, FetchResponse},
    playground::{Playground, DEFAULT_PROGRAM},
    recognizer::{JOKE, LOADING},
    transform::TransformPath,
};

enum JokeService {
    Up,
    Down,
    Garbled,
}

impl FetchCapability for JokeService {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        let reply = match self {
            JokeService::Up => {
                assert!(request.url.contains("random_joke"));
                Ok(FetchResponse {
                    status: 200,
                    body: r#"{"id":1,"type":"general","setup":"Why?","punchline":"Because."}"#.into(),
                })
            }
            JokeService::Down => Err(anyhow!("connection refused")),
            JokeService::Garbled => Ok(FetchResponse { status: 200, body: "<html>".into() }),
        };
        async move { reply }.boxed()
    }
}

fn playground(service: JokeService) -> Playground {
    let settings = ExecutionSettings { max_wait: Duration::from_millis(500), ..ExecutionSettings::default() };
    Playground::new(settings, Arc::new(service))
}

#[tokio::test]
async fn typed_greeting_is_answered_without_running() {
    let pg = playground(JokeService::Down);
    let src = "const greet = (name: string): string => {\n  return `Hello, ${name}!`;\n};\n\nconst userName: string = \"Ada\";\nconsole.log(greet(userName));";
    let report = pg.execute(src).await;
    assert_eq!(report.path, TransformPath::DirectPattern);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.outcome, ExecutionOutcome::Success("Hello, Ada!".into()));
}

#[tokio::test]
async fn joke_teller_is_answered_without_running() {
    let pg = playground(JokeService::Down);
    let src = "const tellJoke = (): string => {\n  return \"Why do programmers prefer dark mode? Because light attracts bugs!\";\n};\nconsole.log(tellJoke());";
    let report = pg.execute(src).await;
    assert_eq!(report.outcome, ExecutionOutcome::Success(JOKE.into()));
}

#[tokio::test]
async fn joke_fetch_shows_loading_then_the_joke() {
    let pg = playground(JokeService::Up);
    let mut seen = Vec::new();
    let report = pg.execute_observed(DEFAULT_PROGRAM, |line| seen.push(line.to_string())).await;
    assert_eq!(seen, vec![LOADING]);
    assert_eq!(report.path, TransformPath::DirectPattern);
    assert_eq!(report.outcome, ExecutionOutcome::Success("Why? - Because.".into()));
}

#[tokio::test]
async fn joke_fetch_failure_is_a_network_error() {
    let report = playground(JokeService::Down).execute(DEFAULT_PROGRAM).await;
    assert_eq!(report.state, RunState::Errored);
    assert_eq!(report.error_kind, Some(ErrorKind::Network));
    let ExecutionOutcome::Failure(message) = &report.outcome else {
        panic!("expected failure, got {:?}", report.outcome);
    };
    assert!(message.starts_with("Error fetching joke: "));
    assert!(message.contains("connection refused"));
}

#[tokio::test]
async fn joke_fetch_with_bad_payload_fails() {
    let report = playground(JokeService::Garbled).execute(DEFAULT_PROGRAM).await;
    assert_eq!(report.error_kind, Some(ErrorKind::Network));
}
