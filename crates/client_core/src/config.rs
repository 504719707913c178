use std::{fs, path::Path};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "club.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub backend_url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:54321".into(),
            api_key: String::new(),
            access_token: None,
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    api_key: Option<String>,
    access_token: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl ClientSettings {
    /// Backend root as a URL ending in `/`, so relative joins stay under it.
    pub fn backend_base_url(&self) -> anyhow::Result<Url> {
        let raw = self.backend_url.trim().trim_end_matches('/');
        if raw.is_empty() {
            bail!("backend url is empty");
        }
        let url = Url::parse(&format!("{raw}/"))
            .with_context(|| format!("invalid backend url '{}'", self.backend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("backend url must use http or https, got '{}'", url.scheme());
        }
        Ok(url)
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |name| std::env::var(name).ok())
}

/// Defaults, then `path` if it parses, then environment overrides.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "config: ignoring unreadable settings file")
            }
        }
    }

    apply_env(&mut settings, env);
    settings
}

fn apply_file(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.api_key {
        settings.api_key = v;
    }
    if file_cfg.access_token.is_some() {
        settings.access_token = file_cfg.access_token;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
}

fn first_set(env: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    // Later names win, matching the APP__ prefix taking precedence.
    names.iter().rev().find_map(|name| env(name))
}

fn apply_env(settings: &mut ClientSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = first_set(&env, &["CLUB_BACKEND_URL", "APP__BACKEND_URL"]) {
        settings.backend_url = v;
    }
    if let Some(v) = first_set(&env, &["CLUB_API_KEY", "APP__API_KEY"]) {
        settings.api_key = v;
    }
    if let Some(v) = env("APP__ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_settings_file(contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("club_settings_test_{suffix}.toml"));
        fs::write(&path, contents).expect("write settings");
        path
    }

    #[test]
    fn missing_file_and_env_yield_defaults() {
        let settings = load_settings_from(Path::new("/nonexistent/club.toml"), |_| None);
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn env_overrides_file_and_app_prefix_wins() {
        let path = temp_settings_file(
            "backend_url = \"https://club.example.com\"\napi_key = \"file-key\"\nrequest_timeout_secs = 5\n",
        );
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CLUB_API_KEY", "club-key"),
            ("APP__API_KEY", "app-key"),
            ("APP__REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]);

        let settings = load_settings_from(&path, |name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(settings.backend_url, "https://club.example.com");
        assert_eq!(settings.api_key, "app-key");
        assert_eq!(settings.request_timeout_secs, 5);
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn backend_base_url_normalizes_trailing_slash() {
        let settings = ClientSettings {
            backend_url: " https://club.example.com/// ".into(),
            ..ClientSettings::default()
        };
        let url = settings.backend_base_url().expect("url");
        assert_eq!(url.as_str(), "https://club.example.com/");
        assert_eq!(
            url.join("rest/v1/").expect("join").join("teams").expect("join").as_str(),
            "https://club.example.com/rest/v1/teams"
        );
    }

    #[test]
    fn backend_base_url_rejects_other_schemes() {
        let settings = ClientSettings {
            backend_url: "ftp://club.example.com".into(),
            ..ClientSettings::default()
        };
        assert!(settings.backend_base_url().is_err());
    }
}
