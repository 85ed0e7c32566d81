//! Tests for configuration loading from the environment and files.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use deepberg_live::config::{LiveConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use deepberg_live::error::LiveError;
use deepberg_live::store::{FileStateStore, StateStore, UserProfile, UserState};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 7] = [
    "API_KEY",
    "GOOGLE_API_KEY",
    "GEMINI_API_KEY",
    "DEEPBERG_LIVE_MODEL",
    "DEEPBERG_LIVE_VOICE",
    "DEEPBERG_LIVE_BASE_URL",
    "DEEPBERG_STATE_DIR",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clean_env() -> EnvGuard {
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

#[test]
fn merge_env_reads_live_settings() {
    let _lock = env_lock_guard();
    let _env = clean_env();
    std::env::set_var("GEMINI_API_KEY", "gemini-key");
    std::env::set_var("DEEPBERG_LIVE_MODEL", "live-test-model");
    std::env::set_var("DEEPBERG_LIVE_VOICE", "Kore");
    std::env::set_var("DEEPBERG_LIVE_BASE_URL", "ws://127.0.0.1:9/live");
    std::env::set_var("DEEPBERG_STATE_DIR", "/tmp/deepberg-state");

    let mut config = LiveConfig::default();
    config.merge_env();

    assert_eq!(config.api_key.as_deref(), Some("gemini-key"));
    assert_eq!(config.model, "live-test-model");
    assert_eq!(config.voice, "Kore");
    assert_eq!(config.base_url, "ws://127.0.0.1:9/live");
    assert_eq!(
        config.state_dir(),
        std::path::PathBuf::from("/tmp/deepberg-state")
    );
}

#[test]
fn gemini_key_wins_over_generic_keys() {
    let _lock = env_lock_guard();
    let _env = clean_env();
    std::env::set_var("API_KEY", "generic");
    std::env::set_var("GOOGLE_API_KEY", "google");

    let mut config = LiveConfig::default();
    config.merge_env();
    assert_eq!(config.api_key.as_deref(), Some("google"));

    std::env::set_var("GEMINI_API_KEY", "gemini");
    config.merge_env();
    assert_eq!(config.api_key.as_deref(), Some("gemini"));
}

#[test]
fn blank_env_values_are_ignored() {
    let _lock = env_lock_guard();
    let _env = clean_env();
    std::env::set_var("GEMINI_API_KEY", "   ");
    std::env::set_var("DEEPBERG_LIVE_MODEL", "");

    let mut config = LiveConfig::default();
    config.merge_env();

    assert!(config.api_key.is_none());
    assert_eq!(config.model, DEFAULT_MODEL);
    assert_eq!(config.base_url, DEFAULT_BASE_URL);
    assert!(matches!(
        config.validate(),
        Err(LiveError::Authentication(_))
    ));
}

#[test]
fn load_reads_file_then_env() {
    let _lock = env_lock_guard();
    let _env = clean_env();
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("live.toml");
    std::fs::write(
        &path,
        r#"
        api_key = "file-key"
        voice = "Puck"
        frame_size = 2048
        heartbeat_interval_secs = 30
        "#,
    )
    .expect("config file should be written");
    std::env::set_var("DEEPBERG_LIVE_VOICE", "Charon");

    let config = LiveConfig::load(&path).expect("config should load");

    assert_eq!(config.api_key.as_deref(), Some("file-key"));
    assert_eq!(config.voice, "Charon");
    assert_eq!(config.frame_size, 2048);
    assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    assert!(config.validate().is_ok());
}

#[test]
fn load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let error = LiveConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(error, LiveError::Io(_)));
}

#[test]
fn state_store_follows_configured_dir() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let config = LiveConfig::builder()
        .state_dir(dir.path().to_path_buf())
        .build();
    let store = FileStateStore::new(config.state_dir());

    let mut state = UserState::default();
    state.login(UserProfile {
        name: "Grace".into(),
        email: "grace@example.com".into(),
        avatar: None,
    });
    store.persist(&state).expect("state should save");

    assert_eq!(store.path(), dir.path().join("deepberg_user.json"));
    assert_eq!(store.load().expect("state should load"), Some(state));
}
