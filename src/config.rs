//! Session configuration parsing, environment overrides, and validation.
//!
//! The configuration is captured once at startup and shared immutably as
//! `Arc<SessionConfig>`. Values come from (in increasing precedence) the
//! built-in defaults, an optional TOML file, and the process environment.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Virtual display geometry in `WIDTHxHEIGHTxDEPTH` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Resolution {
    /// Horizontal pixels.
    pub width: u32,
    /// Vertical pixels.
    pub height: u32,
    /// Colour depth in bits per pixel.
    pub depth: u8,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            depth: 24,
        }
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.depth)
    }
}

impl FromStr for Resolution {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || AppError::Config(format!("invalid resolution '{raw}', expected WxHxD"));

        let mut parts = raw.trim().split(['x', 'X']);
        let width = parts.next().and_then(|p| p.parse::<u32>().ok());
        let height = parts.next().and_then(|p| p.parse::<u32>().ok());
        let depth = parts.next().and_then(|p| p.parse::<u8>().ok());
        if parts.next().is_some() {
            return Err(invalid());
        }

        let (Some(width), Some(height), Some(depth)) = (width, height, depth) else {
            return Err(invalid());
        };

        if width == 0 || height == 0 {
            return Err(AppError::Config(format!(
                "resolution '{raw}' must have non-zero width and height"
            )));
        }
        if !matches!(depth, 8 | 16 | 24 | 32) {
            return Err(AppError::Config(format!(
                "resolution '{raw}' has unsupported depth {depth}"
            )));
        }

        Ok(Self {
            width,
            height,
            depth,
        })
    }
}

impl TryFrom<String> for Resolution {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

/// External programs launched for each managed service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ProgramsConfig {
    /// Virtual display server.
    pub display_server: String,
    /// Command used to query the display for readiness.
    pub display_probe: String,
    /// Window manager started on the display.
    pub window_shell: String,
    /// Remote-framebuffer (VNC) server.
    pub remote_access: String,
    /// WebSocket bridge serving the browser-based viewer.
    pub web_viewer: String,
    /// Static web root handed to the web viewer bridge.
    pub web_viewer_root: PathBuf,
    /// Controlled browser executable.
    pub browser: String,
    /// Additional browser arguments appended after the managed flags.
    pub browser_args: Vec<String>,
}

impl Default for ProgramsConfig {
    fn default() -> Self {
        Self {
            display_server: "Xvfb".into(),
            display_probe: "xdpyinfo".into(),
            window_shell: "fluxbox".into(),
            remote_access: "x11vnc".into(),
            web_viewer: "websockify".into(),
            web_viewer_root: PathBuf::from("/usr/share/novnc"),
            browser: "chromium".into(),
            browser_args: Vec::new(),
        }
    }
}

/// Polling cadences and budgets (milliseconds unless noted).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimingsConfig {
    /// Maximum readiness probes before the display is declared timed out.
    pub display_poll_attempts: u32,
    /// Delay between display readiness probes.
    pub display_poll_interval_ms: u64,
    /// Warm-up pause after launching the window shell.
    pub shell_warmup_ms: u64,
    /// Interval between application liveness checks.
    pub monitor_interval_ms: u64,
    /// Cooldown between detecting a dead application and relaunching it.
    pub restart_cooldown_ms: u64,
    /// Maximum checks for the remote-access port to accept connections.
    pub bind_check_attempts: u32,
    /// Delay between remote-access port checks.
    pub bind_check_interval_ms: u64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            display_poll_attempts: 30,
            display_poll_interval_ms: 1000,
            shell_warmup_ms: 2000,
            monitor_interval_ms: 5000,
            restart_cooldown_ms: 2000,
            bind_check_attempts: 20,
            bind_check_interval_ms: 250,
        }
    }
}

impl TimingsConfig {
    /// Delay between display readiness probes.
    #[must_use]
    pub fn display_poll_interval(&self) -> Duration {
        Duration::from_millis(self.display_poll_interval_ms)
    }

    /// Warm-up pause after launching the window shell.
    #[must_use]
    pub fn shell_warmup(&self) -> Duration {
        Duration::from_millis(self.shell_warmup_ms)
    }

    /// Interval between application liveness checks.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Cooldown before relaunching a dead application.
    #[must_use]
    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }

    /// Delay between remote-access port checks.
    #[must_use]
    pub fn bind_check_interval(&self) -> Duration {
        Duration::from_millis(self.bind_check_interval_ms)
    }
}

/// Immutable session configuration.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SessionConfig {
    /// Virtual display geometry.
    pub resolution: Resolution,
    /// X display identifier, e.g. `:99`.
    pub display: String,
    /// Persistent browser profile directory; survives restarts.
    pub state_dir: PathBuf,
    /// Remote-access (VNC) password; `None` starts the server in open mode.
    pub vnc_password: Option<String>,
    /// Control-port token; `None` forwards without authentication.
    pub devtools_token: Option<String>,
    /// Externally reachable control port served by the gateway.
    pub external_debug_port: u16,
    /// Loopback-only control port the browser listens on.
    pub internal_debug_port: u16,
    /// Remote-framebuffer listening port.
    pub vnc_port: u16,
    /// Web viewer port; `0` disables the bridge.
    pub web_proxy_port: u16,
    /// Owner-only file holding the hashed remote-access password.
    pub vnc_password_file: PathBuf,
    /// External program names.
    pub programs: ProgramsConfig,
    /// Polling cadences.
    pub timings: TimingsConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            display: ":99".into(),
            state_dir: PathBuf::from("/data/browser-profile"),
            vnc_password: None,
            devtools_token: None,
            external_debug_port: 9222,
            internal_debug_port: 9223,
            vnc_port: 5900,
            web_proxy_port: 6080,
            vnc_password_file: PathBuf::from("/root/.vnc/passwd"),
            programs: ProgramsConfig::default(),
            timings: TimingsConfig::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "<redacted>");
        f.debug_struct("SessionConfig")
            .field("resolution", &self.resolution)
            .field("display", &self.display)
            .field("state_dir", &self.state_dir)
            .field("vnc_password", &redact(&self.vnc_password))
            .field("devtools_token", &redact(&self.devtools_token))
            .field("external_debug_port", &self.external_debug_port)
            .field("internal_debug_port", &self.internal_debug_port)
            .field("vnc_port", &self.vnc_port)
            .field("web_proxy_port", &self.web_proxy_port)
            .field("vnc_password_file", &self.vnc_password_file)
            .field("programs", &self.programs)
            .field("timings", &self.timings)
            .finish()
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the current process environment.
    ///
    /// The environment is read exactly once; later changes are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&env)
    }

    /// Build configuration from defaults overridden by `env`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_env_map(env: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables. Blank values are ignored.
    ///
    /// Structured values are trimmed; credentials are taken verbatim.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        let verbatim = |key: &str| {
            env.get(key)
                .map(String::as_str)
                .filter(|value| !value.trim().is_empty())
        };
        let get = |key: &str| verbatim(key).map(str::trim);

        if let Some(raw) = get("RESOLUTION") {
            self.resolution = raw.parse()?;
        }
        if let Some(display) = get("DISPLAY") {
            display.clone_into(&mut self.display);
        }
        if let Some(dir) = get("USER_DATA_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(password) = verbatim("VNC_PASSWORD") {
            self.vnc_password = Some(password.to_owned());
        }
        if let Some(token) = verbatim("DEVTOOLS_TOKEN") {
            self.devtools_token = Some(token.to_owned());
        }
        if let Some(raw) = get("EXTERNAL_DEBUG_PORT") {
            self.external_debug_port = parse_port("EXTERNAL_DEBUG_PORT", raw)?;
        }
        if let Some(raw) = get("INTERNAL_DEBUG_PORT") {
            self.internal_debug_port = parse_port("INTERNAL_DEBUG_PORT", raw)?;
        }
        if let Some(raw) = get("VNC_PORT") {
            self.vnc_port = parse_port("VNC_PORT", raw)?;
        }
        if let Some(raw) = get("NOVNC_PORT") {
            self.web_proxy_port = parse_port("NOVNC_PORT", raw)?;
        }
        if let Some(path) = get("VNC_PASSWORD_FILE") {
            self.vnc_password_file = PathBuf::from(path);
        }
        if let Some(bin) = get("CHROME_BIN") {
            bin.clone_into(&mut self.programs.browser);
        }
        if let Some(args) = get("CHROME_EXTRA_ARGS") {
            self.programs.browser_args = args.split_whitespace().map(str::to_owned).collect();
        }

        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.external_debug_port == self.internal_debug_port {
            return Err(AppError::Config(format!(
                "external and internal debug ports must differ (both {})",
                self.internal_debug_port
            )));
        }

        if self.internal_debug_port == 0 || self.vnc_port == 0 {
            return Err(AppError::Config(
                "internal debug port and vnc port must be non-zero".into(),
            ));
        }

        if !self.display.starts_with(':') {
            return Err(AppError::Config(format!(
                "display '{}' must look like ':<number>'",
                self.display
            )));
        }

        if self.state_dir.as_os_str().is_empty() {
            return Err(AppError::Config("state_dir must not be empty".into()));
        }

        if self.timings.display_poll_attempts == 0 {
            return Err(AppError::Config(
                "display_poll_attempts must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Whether the browser-based viewer bridge should be started.
    #[must_use]
    pub fn web_viewer_enabled(&self) -> bool {
        self.web_proxy_port != 0
    }
}

fn parse_port(key: &str, raw: &str) -> Result<u16> {
    raw.parse::<u16>()
        .map_err(|err| AppError::Config(format!("{key} must be a port number: {err}")))
}
