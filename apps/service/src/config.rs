use std::collections::BTreeMap;
use std::time::Duration;
use std::{env, fmt, fs, path};

use pollwatch::parser::split_cookie_pairs;
use pollwatch::{
    ParseError, PollPolicy, PolicyError, ProbeSettings, RequestDescriptor, SmtpSettings,
    SuccessMarker,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overrides `smtp.password` when set
pub const SMTP_PASSWORD_ENV: &str = "POLLWATCH_SMTP_PASSWORD";

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {}: {}", .0.display(), .1)]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to write config {}: {}", .0.display(), .1)]
    WriteFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub query: Query,
    pub probe: Probe,
    pub smtp: SmtpSettings,
}

/// What to poll and how often
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub url: String,
    pub stage: String,
    pub interval_seconds: u64,
    /// 0 disables the cap
    pub max_attempts: u32,
    pub fail_notify_every: u32,
    pub user_agent: String,
    pub cookie: String,
    pub timeout_seconds: u64,
}

/// Request form and success marker of the polled endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub body_field: String,
    /// Sent empty alongside the body field; empty string disables it
    pub secondary_field: String,
    pub status_field: String,
    pub ok_value: String,
    pub data_field: String,
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            url: "https://bm.ruankao.org.cn/query/score/result".into(),
            stage: String::new(),
            interval_seconds: 600,
            max_attempts: 0,
            fail_notify_every: 6,
            user_agent: String::new(),
            cookie: String::new(),
            timeout_seconds: pollwatch::DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

impl Default for Probe {
    fn default() -> Self {
        let marker = SuccessMarker::default();
        let extra_headers = [
            ("Accept", "*/*"),
            ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
            ("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8"),
            ("Origin", "https://bm.ruankao.org.cn"),
            ("Referer", "https://bm.ruankao.org.cn/index.php/query/score"),
            ("Priority", "u=1, i"),
            ("Sec-Ch-Ua", r#""Google Chrome";v="137", "Chromium";v="137", "Not/A)Brand";v="24""#),
            ("Sec-Ch-Ua-Mobile", "?0"),
            ("Sec-Ch-Ua-Platform", r#""Windows""#),
            ("Sec-Fetch-Dest", "empty"),
            ("Sec-Fetch-Mode", "cors"),
            ("Sec-Fetch-Site", "same-origin"),
            ("X-Requested-With", "XMLHttpRequest"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            body_field: "stage".into(),
            secondary_field: "jym".into(),
            status_field: marker.status_field,
            ok_value: marker.ok_value,
            data_field: marker.data_field,
            extra_headers,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pollwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("pollwatch/config.toml"))
}

/// Resolve the config file location from an optional override
pub fn resolve_path(optional_path: Option<impl AsRef<path::Path>>) -> Result<path::PathBuf, Error> {
    match optional_path {
        Some(path) => Ok(normalize_toml_path(path.as_ref())),
        None => default_config_path(),
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let max_attempts =
            if self.query.max_attempts == 0 { "unbounded".to_string() } else { self.query.max_attempts.to_string() };
        let password = if self.smtp.password.is_empty() { "<unset>" } else { "********" };

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Query")?;
        write_1(f, "URL", &self.query.url)?;
        write_1(f, "Stage", &self.query.stage)?;
        write_1(f, "Interval (s)", &self.query.interval_seconds)?;
        write_1(f, "Max Attempts", &max_attempts)?;
        write_1(f, "Failure Reminder Every", &self.query.fail_notify_every)?;
        write_1(f, "User Agent", &self.query.user_agent)?;
        write_1(f, "Cookie Pairs", &split_cookie_pairs(&self.query.cookie).len())?;
        write_1(f, "Timeout (s)", &self.query.timeout_seconds)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Body Field", &self.probe.body_field)?;
        write_1(f, "Secondary Field", &self.probe.secondary_field)?;
        write_1(
            f,
            "Success Marker",
            &format!("{} == {:?} with non-empty {}", self.probe.status_field, self.probe.ok_value, self.probe.data_field),
        )?;
        write_1(f, "Extra Headers", &self.probe.extra_headers.len())?;
        write_title_1(f, "SMTP")?;
        write_1(f, "Server", &format!("{}:{}", self.smtp.server, self.smtp.port))?;
        write_1(f, "Sender", &self.smtp.sender)?;
        write_1(f, "Password", &password)?;
        write_1(f, "Receiver", &self.smtp.receiver)?;
        write_1(f, "Notifications", &if self.notify_enabled() { "enabled" } else { "disabled" })?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pollwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(&config::resolve_path(None::<&path::Path>)?)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(config_path: &path::Path) -> Result<Self, Error> {
        if config_path.exists() {
            let raw_string = fs::read_to_string(config_path)
                .map_err(|err| Error::ReadFailed(config_path.to_path_buf(), err))?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(config_path)?;
            Ok(config)
        }
    }

    /// Apply environment overrides. Kept out of [`Config::from_config`] so
    /// secrets from the environment are never written back to disk.
    pub fn apply_env(&mut self) {
        if let Ok(password) = env::var(SMTP_PASSWORD_ENV) {
            self.smtp.password = password;
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::WriteFailed(parent.to_path_buf(), err))?;
        }

        fs::write(path, config_str).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))
    }

    /// Mail goes out only when every SMTP field is filled in
    pub fn notify_enabled(&self) -> bool { self.smtp.is_complete() }

    /// Copy what a parsed command carries into the query and probe sections
    pub fn merge_descriptor(&mut self, descriptor: &RequestDescriptor) {
        self.query.url = descriptor.target_url().to_string();
        if let Some(stage) = descriptor.body_field() {
            self.query.stage = stage.to_string();
        }
        if let Some(agent) = descriptor.header("User-Agent") {
            self.query.user_agent = agent.to_string();
        }
        if !descriptor.cookies().is_empty() {
            self.query.cookie = descriptor.cookie_header();
        }

        // Everything else replaces the same-named extra header, whatever its case
        for (name, value) in descriptor.headers() {
            if ["user-agent", "cookie", "content-length"].iter().any(|skip| name.eq_ignore_ascii_case(skip)) {
                continue;
            }
            self.probe.extra_headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            self.probe.extra_headers.insert(name.clone(), value.clone());
        }
    }

    /// A run needs a URL, a stage and at least one cookie
    pub fn validate_for_run(&self) -> Result<(), Error> {
        if self.query.url.is_empty() {
            return Err(Error::Missing("query.url"));
        }
        if self.query.stage.is_empty() {
            return Err(Error::Missing("query.stage"));
        }
        if split_cookie_pairs(&self.query.cookie).is_empty() {
            return Err(Error::Missing("query.cookie"));
        }
        Ok(())
    }

    pub fn descriptor(&self) -> Result<RequestDescriptor, ParseError> {
        let descriptor = RequestDescriptor::new(self.query.url.as_str())?;
        let descriptor = split_cookie_pairs(&self.query.cookie)
            .into_iter()
            .fold(descriptor, |descriptor, (key, value)| descriptor.with_cookie(key, value));
        Ok(descriptor.with_body_field(self.query.stage.as_str()))
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            body_field: self.probe.body_field.clone(),
            secondary_field: Some(self.probe.secondary_field.clone()).filter(|field| !field.is_empty()),
            marker: SuccessMarker {
                status_field: self.probe.status_field.clone(),
                ok_value: self.probe.ok_value.clone(),
                data_field: self.probe.data_field.clone(),
            },
            user_agent: Some(self.query.user_agent.clone()).filter(|agent| !agent.is_empty()),
            extra_headers: self.probe.extra_headers.clone().into_iter().collect(),
            timeout: Duration::from_secs(self.query.timeout_seconds),
        }
    }

    pub fn policy(&self) -> Result<PollPolicy, PolicyError> {
        PollPolicy::new(
            self.query.interval_seconds,
            self.query.max_attempts,
            self.query.fail_notify_every,
            self.notify_enabled(),
        )
    }
}
