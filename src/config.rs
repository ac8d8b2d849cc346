use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use dirs_next::home_dir;
use std::fmt;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Display mode for a scheduling session. Exactly one is active; changing it
/// means tearing the session down and starting a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Screen follows the PIR motion sensor with an inactivity timeout.
    #[value(name = "pir")]
    Pir,
    /// Screen follows the configured work window.
    #[value(name = "time")]
    Time,
    /// Screen is always on, images loop 24/7.
    #[value(name = "continuous")]
    Continuous,
    /// Work window forces the screen on; outside it the PIR rules apply.
    #[value(name = "time_pir")]
    TimePir,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Pir => "pir",
            Mode::Time => "time",
            Mode::Continuous => "continuous",
            Mode::TimePir => "time_pir",
        }
    }

    /// Whether this mode reads the motion sensor at all.
    pub fn uses_motion(&self) -> bool {
        matches!(self, Mode::Pir | Mode::TimePir)
    }

    /// Whether this mode evaluates the work window.
    pub fn uses_window(&self) -> bool {
        matches!(self, Mode::Time | Mode::TimePir)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective application configuration after defaults, file, and CLI merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: Option<String>,
    pub mode: Mode,
    /// BCM pin the PIR sensor data line is wired to.
    pub pir_pin: u8,
    /// Seconds of no motion before the screen is switched off (pir/time_pir).
    pub screen_timeout_secs: u64,
    /// Work window bounds as "HH:MM" (time/time_pir).
    pub work_start: String,
    pub work_end: String,
    pub image_folder: PathBuf,
    /// Seconds each image stays up before advancing.
    pub image_dwell_secs: u64,
    pub random_order: bool,
    /// Whether the engine produces status text at all.
    pub show_status: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            mode: Mode::Pir,
            pir_pin: 4,
            screen_timeout_secs: 120,
            work_start: "08:00".to_string(),
            work_end: "17:00".to_string(),
            image_folder: default_image_folder(),
            image_dwell_secs: 5,
            random_order: false,
            show_status: true,
        }
    }
}

fn default_image_folder() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Pictures/slideshow")
}

/// On-disk shape: every field optional so the file can set just what it wants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub log_level: Option<String>,
    pub mode: Option<Mode>,
    pub pir_pin: Option<u8>,
    pub screen_timeout_secs: Option<u64>,
    pub work_start: Option<String>,
    pub work_end: Option<String>,
    pub image_folder: Option<PathBuf>,
    pub image_dwell_secs: Option<u64>,
    pub random_order: Option<bool>,
    pub show_status: Option<bool>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "vitrine", version, about = "Unattended slideshow display")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Enable debug log level
    #[arg(short = 'v', long, alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,
    #[arg(long)]
    pub pir_pin: Option<u8>,
    #[arg(long)]
    pub screen_timeout: Option<u64>,
    #[arg(long)]
    pub work_start: Option<String>,
    #[arg(long)]
    pub work_end: Option<String>,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub image_folder: Option<PathBuf>,
    #[arg(long)]
    pub image_dwell: Option<u64>,
    #[arg(long, action = ArgAction::Set)]
    pub random_order: Option<bool>,
    #[arg(long, action = ArgAction::Set)]
    pub show_status: Option<bool>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();

    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            merge(&mut cfg, read_yaml(p)?);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        merge(&mut cfg, read_yaml(&p)?);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, &cli);

    // 4) Validate
    validate(&cfg)?;

    if cli.dump_config {
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/vitrine/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/vitrine/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/vitrine.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["vitrine.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<FileConfig, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: FileConfig = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: FileConfig) {
    if src.log_level.is_some()          { dst.log_level = src.log_level; }
    if let Some(v) = src.mode           { dst.mode = v; }
    if let Some(v) = src.pir_pin        { dst.pir_pin = v; }
    if let Some(v) = src.screen_timeout_secs { dst.screen_timeout_secs = v; }
    if let Some(v) = src.work_start     { dst.work_start = v; }
    if let Some(v) = src.work_end       { dst.work_end = v; }
    if let Some(v) = src.image_folder   { dst.image_folder = v; }
    if let Some(v) = src.image_dwell_secs { dst.image_dwell_secs = v; }
    if let Some(v) = src.random_order   { dst.random_order = v; }
    if let Some(v) = src.show_status    { dst.show_status = v; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.debug                         { cfg.log_level = Some("debug".to_string()); }
    if let Some(v) = cli.mode            { cfg.mode = v; }
    if let Some(v) = cli.pir_pin         { cfg.pir_pin = v; }
    if let Some(v) = cli.screen_timeout  { cfg.screen_timeout_secs = v; }
    if let Some(v) = cli.work_start.clone() { cfg.work_start = v; }
    if let Some(v) = cli.work_end.clone()   { cfg.work_end = v; }
    if let Some(v) = cli.image_folder.clone() { cfg.image_folder = v; }
    if let Some(v) = cli.image_dwell     { cfg.image_dwell_secs = v; }
    if let Some(v) = cli.random_order    { cfg.random_order = v; }
    if let Some(v) = cli.show_status     { cfg.show_status = v; }
}

/// Put any invariants here (required fields, ranges, etc.)
///
/// Malformed work-window times are deliberately NOT rejected: the schedule
/// layer falls back to safe defaults with a logged warning.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.screen_timeout_secs == 0 {
        return Err(ConfigError::Validation("screen_timeout_secs must be > 0".into()));
    }
    if cfg.image_dwell_secs == 0 {
        return Err(ConfigError::Validation("image_dwell_secs must be > 0".into()));
    }
    // BCM header pins on every Pi model stop at 27
    if cfg.pir_pin > 27 {
        return Err(ConfigError::Validation(format!(
            "pir_pin {} is not a valid BCM pin (0..=27)",
            cfg.pir_pin
        )));
    }
    Ok(())
}
