//! Network capability handed to scripts as `fetch`.
//!
//! Scripts never reach the network directly. The engine calls a
//! [`FetchCapability`]; when interception applies, an [`InterceptingFetch`]
//! lets allow-listed URLs through to the real client and answers everything
//! else with a canned payload.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result};
use futures::{future::BoxFuture, FutureExt};
use rquickjs::{Ctx, Function};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{runtime::Handle, sync::Notify, task::JoinHandle};
use tracing::{debug, info};

use crate::config::Config;

/// Body returned to intercepted requests.
pub const MOCK_PAYLOAD: &str = r#"{"message":"Mock API response (non-joke API)"}"#;

/// Promise-returning `fetch`. Each call hands a request id to the host and
/// parks the promise until the engine loop settles that id. Responses expose
/// `ok`, `status`, `url`, `text()` and `json()`.
const FETCH_JS: &str = r#"(() => {
  const request = globalThis.__tsplay_fetch;
  delete globalThis.__tsplay_fetch;
  const waiting = new Map();
  let nextId = 1;
  globalThis.fetch = (input, init) => new Promise((resolve, reject) => {
    const id = nextId++;
    const url = String(input);
    const options = init || {};
    const body = options.body === undefined || options.body === null ? null : String(options.body);
    waiting.set(id, { url, resolve, reject });
    request(id, url, String(options.method || 'GET'), body);
  });
  globalThis.__tsplay_settle = (id, payload) => {
    const pending = waiting.get(id);
    if (!pending) return;
    waiting.delete(id);
    const reply = JSON.parse(payload);
    if (reply.error !== undefined) {
      pending.reject(new TypeError(reply.error));
      return;
    }
    pending.resolve({
      ok: reply.status >= 200 && reply.status < 300,
      status: reply.status,
      url: pending.url,
      text: () => Promise.resolve(reply.body),
      json: () => Promise.resolve().then(() => JSON.parse(reply.body)),
    });
  };
})();"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: "GET".into(), body: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can perform a fetch on behalf of a script.
pub trait FetchCapability: Send + Sync {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>>;
}

/// The real network, through reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tsplay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let timeout = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(60);
        Self::new(Duration::from_secs(timeout))
    }
}

impl FetchCapability for HttpFetcher {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        async move {
            let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method {:?}", request.method))?;
            let mut builder = self.http.request(method, &request.url);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let resp = builder
                .send()
                .await
                .with_context(|| format!("request to {} failed", request.url))?;
            let status = resp.status().as_u16();
            let body = resp.text().await.context("failed to read response body")?;
            Ok(FetchResponse { status, body })
        }
        .boxed()
    }
}

/// Allow-list gate in front of a real capability.
pub struct InterceptingFetch {
    upstream: Arc<dyn FetchCapability>,
    allow_list: Vec<String>,
}

impl InterceptingFetch {
    pub fn new(upstream: Arc<dyn FetchCapability>, allow_list: Vec<String>) -> Self {
        Self { upstream, allow_list }
    }

    /// The URL contains one of the allow-listed substrings.
    pub fn allows(&self, url: &str) -> bool {
        self.allow_list.iter().any(|entry| url.contains(entry.as_str()))
    }
}

impl FetchCapability for InterceptingFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        if self.allows(&request.url) {
            debug!(url = %request.url, "fetch allowed through");
            return self.upstream.fetch(request);
        }
        info!(url = %request.url, "fetch intercepted");
        async { Ok(FetchResponse { status: 200, body: MOCK_PAYLOAD.to_string() }) }.boxed()
    }
}

/// Interception applies to scripts that both call `fetch(` and use `async`.
pub fn should_intercept(script: &str) -> bool {
    script.contains("fetch(") && script.contains("async")
}

#[derive(Debug, Default)]
struct Inbox {
    settled: Vec<(u32, String)>,
    in_flight: usize,
    tasks: Vec<JoinHandle<()>>,
}

/// Scope of an installed `fetch`. Requests run as tokio tasks; their replies
/// wait here until the engine loop hands them back to the script. Dropping
/// the shim aborts whatever is still in flight.
#[derive(Debug)]
pub struct NetworkShim {
    intercepting: bool,
    inbox: Arc<Mutex<Inbox>>,
}

impl NetworkShim {
    /// Replies that arrived since the last call, as `(request id, payload)`.
    pub fn take_settled(&self) -> Vec<(u32, String)> {
        std::mem::take(&mut lock(&self.inbox).settled)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.inbox).in_flight
    }
}

impl Drop for NetworkShim {
    fn drop(&mut self) {
        let mut inbox = lock(&self.inbox);
        let aborted = inbox.tasks.iter().filter(|t| !t.is_finished()).count();
        for task in inbox.tasks.drain(..) {
            task.abort();
        }
        debug!(intercepting = self.intercepting, aborted, "network capability released");
    }
}

fn lock(inbox: &Mutex<Inbox>) -> MutexGuard<'_, Inbox> {
    inbox.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Installs `fetch` into `ctx`. Requests are spawned on `handle`; `wake` is
/// notified whenever a reply lands.
pub fn install<'js>(
    ctx: &Ctx<'js>,
    fetch: Arc<dyn FetchCapability>,
    intercepting: bool,
    handle: Handle,
    wake: Arc<Notify>,
) -> rquickjs::Result<NetworkShim> {
    let inbox = Arc::new(Mutex::new(Inbox::default()));
    let requests = inbox.clone();
    let host = Function::new(
        ctx.clone(),
        move |id: u32, url: String, method: String, body: Option<String>| {
            let request = FetchRequest { url, method, body };
            let (fetch, inbox, wake) = (fetch.clone(), requests.clone(), wake.clone());
            lock(&requests).in_flight += 1;
            let task = handle.spawn(async move {
                let reply = match fetch.fetch(request).await {
                    Ok(resp) => json!({ "status": resp.status, "body": resp.body }),
                    Err(e) => json!({ "error": format!("{e:#}") }),
                };
                {
                    let mut inbox = lock(&inbox);
                    inbox.in_flight = inbox.in_flight.saturating_sub(1);
                    inbox.settled.push((id, reply.to_string()));
                }
                wake.notify_one();
            });
            let mut inbox = lock(&requests);
            inbox.tasks.retain(|t| !t.is_finished());
            inbox.tasks.push(task);
        },
    )?;
    ctx.globals().set("__tsplay_fetch", host)?;
    ctx.eval::<(), _>(FETCH_JS)?;

    debug!(intercepting, "network capability installed");
    Ok(NetworkShim { intercepting, inbox })
}
