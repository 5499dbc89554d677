//! Tests for environment-driven configuration.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use gptscript::config::{
    EngineSettings, GlobalOptions, TransportMode, ENV_BIN, ENV_DISABLE_SERVER, ENV_TOKEN, ENV_URL,
    ENV_WORKSPACE_ID,
};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 5] = [
    ENV_URL,
    ENV_TOKEN,
    ENV_BIN,
    ENV_DISABLE_SERVER,
    ENV_WORKSPACE_ID,
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

fn clear_config_env() {
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
}

#[test]
fn global_options_read_url_and_token() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_config_env();
    std::env::set_var(ENV_URL, "127.0.0.1:9999");
    std::env::set_var(ENV_TOKEN, "  tok  ");

    let options = GlobalOptions::from_env();
    assert_eq!(options.url, "127.0.0.1:9999");
    assert_eq!(options.token, "tok");
}

#[test]
fn explicit_options_win_over_environment() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_config_env();
    std::env::set_var(ENV_URL, "http://from-env:1");

    let explicit = GlobalOptions {
        url: "http://explicit:2".into(),
        ..Default::default()
    };
    let merged = GlobalOptions::merge([&GlobalOptions::from_env(), &explicit]);
    assert_eq!(merged.url, "http://explicit:2");

    let merged = GlobalOptions::merge([&GlobalOptions::from_env(), &GlobalOptions::default()]);
    assert_eq!(merged.url, "http://from-env:1");
}

#[test]
fn engine_settings_defaults() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_config_env();

    let settings = EngineSettings::from_env();
    assert_eq!(settings.bin_path, PathBuf::from("gptscript"));
    assert!(!settings.disable_server);
    assert_eq!(settings.workspace_id, None);
    assert_eq!(settings.transport, TransportMode::Http);
}

#[test]
fn engine_settings_read_environment() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_config_env();
    std::env::set_var(ENV_BIN, "/opt/gptscript/bin/gptscript");
    std::env::set_var(ENV_DISABLE_SERVER, "true");
    std::env::set_var(ENV_WORKSPACE_ID, "ws-42");

    let settings = EngineSettings::from_env();
    assert_eq!(settings.bin_path, PathBuf::from("/opt/gptscript/bin/gptscript"));
    assert!(settings.disable_server);
    assert_eq!(settings.workspace_id.as_deref(), Some("ws-42"));
}

#[test]
fn relative_bin_resolves_next_to_current_executable() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_config_env();
    std::env::set_var(ENV_BIN, "<me>/tools/gptscript");

    let settings = EngineSettings::from_env();
    let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
    assert_eq!(settings.bin_path, exe_dir.join("tools/gptscript"));
}

#[test]
fn disable_server_requires_literal_true() {
    let _lock = env_lock_guard();
    let _guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    clear_config_env();
    std::env::set_var(ENV_DISABLE_SERVER, "1");

    assert!(!EngineSettings::from_env().disable_server);
}
