use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::PathBuf,
    time::Duration,
};

use directories::BaseDirs;

pub const DEFAULT_JOKE_API_URL: &str = "https://official-joke-api.appspot.com/random_joke";

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    overlay_env: bool,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        // Read .tsplayrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, overlay_env: true, config_path }
    }

    /// Defaults plus the given pairs; never reads the rc file or the environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Self { inner: map, overlay_env: false, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        // ENV first
        if self.overlay_env {
            if let Ok(v) = env::var(key) {
                return Some(v);
            }
        }
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key).and_then(|v| v.trim().parse::<f32>().ok())
    }

    pub fn cache_path(&self) -> PathBuf {
        self.get("CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("tsplay").join("cache"))
    }
}

/// Timing and network knobs for one execution request.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Delay the harness awaits after the script body before signalling completion.
    pub settle_delay: Duration,
    /// Interval between completion polls.
    pub poll_interval: Duration,
    /// Accumulated poll wait after which a run is reported as timed out.
    pub max_wait: Duration,
    /// URL substrings allowed through the network interception shim.
    pub allow_list: Vec<String>,
    pub joke_api_url: String,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            poll_interval: Duration::from_millis(100),
            max_wait: Duration::from_millis(3000),
            allow_list: vec!["joke-api".to_string(), "official-joke-api".to_string()],
            joke_api_url: DEFAULT_JOKE_API_URL.to_string(),
        }
    }
}

impl ExecutionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            cfg.get_u64(key).map(Duration::from_millis).unwrap_or(fallback)
        };
        let allow_list = cfg
            .get("FETCH_ALLOW_LIST")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.allow_list);

        Self {
            settle_delay: millis("SETTLE_DELAY_MS", defaults.settle_delay),
            // a zero interval would spin the poller
            poll_interval: millis("POLL_INTERVAL_MS", defaults.poll_interval).max(Duration::from_millis(1)),
            max_wait: millis("MAX_WAIT_MS", defaults.max_wait),
            allow_list,
            joke_api_url: cfg.get("JOKE_API_URL").unwrap_or(defaults.joke_api_url),
        }
    }
}

fn is_config_key(k: &str) -> bool {
    // Accept known keys or TSPLAY_*/OPENAI_* for forward-compat
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "DEFAULT_MODEL",
        "REQUEST_TIMEOUT",
        "ASSISTANT_TEMPERATURE",
        "CACHE_PATH",
        "CACHE_LENGTH",
        "SETTLE_DELAY_MS",
        "POLL_INTERVAL_MS",
        "MAX_WAIT_MS",
        "JOKE_API_URL",
        "FETCH_ALLOW_LIST",
        "PRETTIFY_MARKDOWN",
        "DEFAULT_COLOR",
    ];

    KEYS.contains(&k) || k.starts_with("TSPLAY_") || k.starts_with("OPENAI_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("tsplay").join(".tsplayrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let temp = env::temp_dir().join("tsplay");

    // Paths
    m.insert(
        "CACHE_PATH".into(),
        temp.join("cache").to_string_lossy().into_owned(),
    );

    // Numbers
    m.insert("CACHE_LENGTH".into(), "100".into());
    m.insert("REQUEST_TIMEOUT".into(), "60".into());
    m.insert("ASSISTANT_TEMPERATURE".into(), "0.7".into());
    m.insert("SETTLE_DELAY_MS".into(), "300".into());
    m.insert("POLL_INTERVAL_MS".into(), "100".into());
    m.insert("MAX_WAIT_MS".into(), "3000".into());

    // Strings
    m.insert("DEFAULT_MODEL".into(), "gpt-4o-mini".into());
    m.insert("DEFAULT_COLOR".into(), "magenta".into());
    m.insert("API_BASE_URL".into(), "default".into());
    m.insert("JOKE_API_URL".into(), DEFAULT_JOKE_API_URL.into());
    m.insert("FETCH_ALLOW_LIST".into(), "joke-api,official-joke-api".into());
    m.insert("TSPLAY_LOG".into(), "warn".into());

    // Bools as strings
    m.insert("PRETTIFY_MARKDOWN".into(), "true".into());

    m
}
