//! Run configuration: built-in defaults, named modem profiles and CLI overrides.
//!
//! Values are resolved with the following precedence (highest first):
//!
//! 1. **Command line** - values given explicitly on the command line
//! 2. **Profile** - the settings-file section named by the modem argument
//! 3. **Built-in defaults**
//!
//! When the modem argument does not name a profile it is used as the modem
//! address. Fields missing from a matched profile fall through to the
//! defaults. The password has no default: it comes from the command line,
//! the profile, or an interactive prompt, in that order.

use crate::error::{LoggerError, Result};
use crate::modem::ModemAddress;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Output rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `Label: value` blocks separated by blank lines
    #[default]
    Dump,
    /// One header row, then one comma-separated row per poll
    Csv,
}

impl OutputFormat {
    /// File extension used for this rendering.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Dump => "log",
            OutputFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Dump => f.write_str("dump"),
            OutputFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Built-in defaults, the lowest precedence layer.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub address: String,
    pub account: String,
    pub interval_minutes: u64,
    pub duration_hours: u64,
    pub format: OutputFormat,
    pub daily_split: bool,
    pub output_dir: PathBuf,
    pub login_path: String,
    pub logout_path: String,
    pub status_paths: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            address: crate::DEFAULT_MODEM_ADDRESS.to_string(),
            account: crate::DEFAULT_ACCOUNT.to_string(),
            interval_minutes: crate::DEFAULT_INTERVAL_MINUTES,
            duration_hours: crate::DEFAULT_DURATION_HOURS,
            format: OutputFormat::Dump,
            daily_split: false,
            output_dir: PathBuf::from("."),
            login_path: "/cgi-bin/login.cgi".to_string(),
            logout_path: "/cgi-bin/logout.cgi".to_string(),
            status_paths: vec![
                "/cgi-bin/status.cgi".to_string(),
                "/cgi-bin/adsl.cgi".to_string(),
            ],
        }
    }
}

/// One settings-file section. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub address: Option<String>,
    pub account: Option<String>,
    pub password: Option<String>,
    pub interval: Option<u64>,
    pub duration: Option<u64>,
    pub format: Option<OutputFormat>,
    pub daily_split: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub output_file: Option<String>,
    pub login_path: Option<String>,
    pub logout_path: Option<String>,
    pub status_paths: Option<Vec<String>>,
}

/// Named modem profiles loaded from a TOML settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    profiles: BTreeMap<String, Profile>,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let profiles = toml::from_str::<BTreeMap<String, Profile>>(text)
            .map_err(|e| LoggerError::config_error(format!("invalid settings file: {}", e)))?;
        Ok(Self { profiles })
    }

    /// Load an explicitly requested settings file; it must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::config_error(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load the settings file from the platform config directory, if present.
    pub fn load_default() -> Result<Self> {
        match default_settings_path() {
            Some(path) if path.is_file() => {
                tracing::debug!("Loading profiles from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

/// `<config dir>/bblogger/profiles.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "bblogger")
        .map(|dirs| dirs.config_dir().join("profiles.toml"))
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Modem address or profile name
    pub modem: Option<String>,
    pub account: Option<String>,
    pub password: Option<String>,
    pub interval: Option<u64>,
    pub duration: Option<u64>,
    pub format: Option<OutputFormat>,
    /// Only ever `Some(true)`: the flag can enable but not disable
    pub daily_split: Option<bool>,
    pub output_dir: Option<PathBuf>,
    /// File name stem replacing the default naming
    pub output_file: Option<String>,
}

/// Reads a secret from the operator without echoing it.
pub trait SecretPrompter {
    fn prompt(&self, message: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal with echo disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl SecretPrompter for TerminalPrompter {
    fn prompt(&self, message: &str) -> io::Result<String> {
        use crossterm::terminal;

        let mut stderr = io::stderr();
        write!(stderr, "{}", message)?;
        stderr.flush()?;

        terminal::enable_raw_mode()?;
        let secret = read_secret();
        terminal::disable_raw_mode()?;
        writeln!(stderr)?;
        secret
    }
}

fn read_secret() -> io::Result<String> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

    let cancelled = || io::Error::new(io::ErrorKind::Interrupted, "password entry cancelled");
    let mut secret = String::new();
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Release {
                continue;
            }
            match key.code {
                KeyCode::Enter => return Ok(secret),
                KeyCode::Esc => return Err(cancelled()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Err(cancelled())
                }
                KeyCode::Backspace => {
                    secret.pop();
                }
                KeyCode::Char(c) => secret.push(c),
                _ => {}
            }
        }
    }
}

/// Fully resolved run parameters. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    /// Modem argument as given (profile name or address), used in file names
    pub modem_id: String,
    pub address: String,
    pub account: String,
    pub password: String,
    pub interval_minutes: u64,
    pub duration_hours: u64,
    pub format: OutputFormat,
    pub daily_split: bool,
    pub output_dir: PathBuf,
    /// Output file stem; `None` keeps the default naming
    pub output_file: Option<String>,
    pub login_path: String,
    pub logout_path: String,
    pub status_paths: Vec<String>,
}

impl fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("modem_id", &self.modem_id)
            .field("address", &self.address)
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .field("interval_minutes", &self.interval_minutes)
            .field("duration_hours", &self.duration_hours)
            .field("format", &self.format)
            .field("daily_split", &self.daily_split)
            .field("output_dir", &self.output_dir)
            .field("output_file", &self.output_file)
            .field("login_path", &self.login_path)
            .field("logout_path", &self.logout_path)
            .field("status_paths", &self.status_paths)
            .finish()
    }
}

impl EffectiveConfig {
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.interval_minutes as i64)
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.duration_hours as i64)
    }
}

/// Merge the three configuration layers.
///
/// `profile` is the settings-file section matching `overrides.modem`, if any.
/// The prompter is only consulted when neither the command line nor the
/// profile supplies a password.
pub fn resolve(
    defaults: &Defaults,
    profile: Option<&Profile>,
    overrides: &Overrides,
    prompter: &dyn SecretPrompter,
) -> Result<EffectiveConfig> {
    let empty = Profile::default();
    let layer = profile.unwrap_or(&empty);

    let modem_id = overrides
        .modem
        .clone()
        .unwrap_or_else(|| defaults.address.clone());

    let address = match profile {
        Some(p) => p.address.clone().unwrap_or_else(|| defaults.address.clone()),
        None => modem_id.clone(),
    };
    address.parse::<ModemAddress>()?;

    let account = overrides
        .account
        .clone()
        .or_else(|| layer.account.clone())
        .unwrap_or_else(|| defaults.account.clone());

    let interval_minutes = overrides
        .interval
        .or(layer.interval)
        .unwrap_or(defaults.interval_minutes);
    if interval_minutes < 1 {
        return Err(LoggerError::config_error(
            "time between checks must be at least 1 minute",
        ));
    }

    let duration_hours = overrides
        .duration
        .or(layer.duration)
        .unwrap_or(defaults.duration_hours);
    if duration_hours < 1 {
        return Err(LoggerError::config_error(
            "logging duration must be at least 1 hour",
        ));
    }

    let status_paths = layer
        .status_paths
        .clone()
        .unwrap_or_else(|| defaults.status_paths.clone());
    if status_paths.is_empty() {
        return Err(LoggerError::config_error(
            "at least one status page path is required",
        ));
    }

    let password = match overrides.password.clone().or_else(|| layer.password.clone()) {
        Some(password) => password,
        None => prompter
            .prompt(&format!("Password for {}@{}: ", account, address))
            .map_err(|e| LoggerError::config_error(format!("could not read password: {}", e)))?,
    };

    Ok(EffectiveConfig {
        modem_id,
        address,
        account,
        password,
        interval_minutes,
        duration_hours,
        format: overrides
            .format
            .or(layer.format)
            .unwrap_or(defaults.format),
        daily_split: overrides
            .daily_split
            .or(layer.daily_split)
            .unwrap_or(defaults.daily_split),
        output_dir: overrides
            .output_dir
            .clone()
            .or_else(|| layer.output_dir.clone())
            .unwrap_or_else(|| defaults.output_dir.clone()),
        output_file: overrides
            .output_file
            .clone()
            .or_else(|| layer.output_file.clone()),
        login_path: layer
            .login_path
            .clone()
            .unwrap_or_else(|| defaults.login_path.clone()),
        logout_path: layer
            .logout_path
            .clone()
            .unwrap_or_else(|| defaults.logout_path.clone()),
        status_paths,
    })
}
