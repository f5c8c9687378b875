use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{invalid_config_error, Error};

/// Settings file picked up from the working directory when `--config` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "tripmap.json";

/// `tripmap` - turns delivery-trip logs into route maps.
///
/// Route fragments are read from DataDog logs, stitched into a single route
/// and rendered as an interactive HTML map, a trip-data JSON export and an
/// optional Google Static Maps image.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON settings file. Defaults to `tripmap.json` when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub credentials: Credentials,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default)]
pub struct Credentials {
    #[arg(long, env = "DD_API_KEY", hide_env_values = true, global = true)]
    pub dd_api_key: Option<String>,

    #[arg(long, env = "DD_APP_KEY", hide_env_values = true, global = true)]
    pub dd_app_key: Option<String>,

    /// DataDog site, e.g. `datadoghq.com` or `datadoghq.eu`.
    #[arg(long, env = "DD_SITE", global = true)]
    pub dd_site: Option<String>,

    #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true, global = true)]
    pub google_maps_api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconstruct the route of a trip and render it.
    Map(MapArgs),

    /// Decode an encoded polyline and print its points as JSON.
    Decode { polyline: String },

    /// Encode `lat,lng` pairs as a polyline.
    Encode {
        #[arg(required = true, allow_hyphen_values = true)]
        points: Vec<String>,
    },

    /// Check that DataDog holds logs for the gRPC handlers the map relies on.
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct MapArgs {
    pub trip_id: Uuid,

    /// Seconds between fragments above which a gap is drawn.
    #[arg(long)]
    pub gap_threshold: Option<i64>,

    /// How many days of logs to search.
    #[arg(long)]
    pub lookback_days: Option<i64>,

    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,

    /// Skip order and restaurant lookups.
    #[arg(long)]
    pub no_enrich: bool,

    /// Also download the Google Static Maps image.
    #[arg(long)]
    pub static_map: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Log events to inspect per handler.
    #[arg(long, default_value_t = 3)]
    pub limit: u32,

    #[arg(long)]
    pub lookback_days: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub datadog: DatadogSettings,
    pub google_maps: GoogleMapsSettings,
    pub gap_threshold_seconds: i64,
    pub lookback_days: i64,
    pub output_dir: PathBuf,
    pub retry: RetrySettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatadogSettings {
    pub site: String,
    pub env: String,
    pub api_key: Option<String>,
    pub app_key: Option<String>,
    pub page_limit: u32,
    pub max_pages: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleMapsSettings {
    pub api_key: Option<String>,
    pub size: String,
    pub scale: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            datadog: DatadogSettings::default(),
            google_maps: GoogleMapsSettings::default(),
            gap_threshold_seconds: 300,
            lookback_days: 7,
            output_dir: PathBuf::from("output"),
            retry: RetrySettings::default(),
        }
    }
}

impl Default for DatadogSettings {
    fn default() -> Self {
        Self {
            site: "datadoghq.com".into(),
            env: "prod".into(),
            api_key: None,
            app_key: None,
            page_limit: 100,
            max_pages: 10,
        }
    }
}

impl Default for GoogleMapsSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            size: "640x640".into(),
            scale: 2,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

impl Settings {
    /// Reads the settings file. An explicit path must exist; the default file
    /// is optional.
    #[tracing::instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&contents)?;

        tracing::debug!("loaded settings from {}", path.display());

        Ok(settings)
    }

    /// Overrides file settings with values from the environment or the command line.
    pub fn merge_credentials(mut self, credentials: &Credentials) -> Self {
        if let Some(key) = &credentials.dd_api_key {
            self.datadog.api_key = Some(key.clone());
        }
        if let Some(key) = &credentials.dd_app_key {
            self.datadog.app_key = Some(key.clone());
        }
        if let Some(site) = &credentials.dd_site {
            self.datadog.site = site.clone();
        }
        if let Some(key) = &credentials.google_maps_api_key {
            self.google_maps.api_key = Some(key.clone());
        }

        self
    }

    pub fn merge_map_args(mut self, args: &MapArgs) -> Self {
        if let Some(seconds) = args.gap_threshold {
            self.gap_threshold_seconds = seconds;
        }
        if let Some(days) = args.lookback_days {
            self.lookback_days = days;
        }
        if let Some(dir) = &args.output_dir {
            self.output_dir = dir.clone();
        }

        self
    }

    pub fn gap_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.gap_threshold_seconds)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::days(self.lookback_days)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.gap_threshold_seconds <= 0 {
            return Err(invalid_config_error("gap threshold must be positive"));
        }
        if self.lookback_days <= 0 {
            return Err(invalid_config_error("lookback must be at least one day"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid_config_error("retry attempts must be at least 1"));
        }
        if self.datadog.page_limit == 0 {
            return Err(invalid_config_error("page limit must be at least 1"));
        }

        Ok(())
    }

    pub fn validate_datadog(&self) -> Result<(), Error> {
        self.validate()?;

        if self.datadog.api_key.is_none() || self.datadog.app_key.is_none() {
            return Err(invalid_config_error(
                "DD_API_KEY and DD_APP_KEY must be set in the environment, .env or settings file",
            ));
        }

        Ok(())
    }
}

#[test]
fn partial_settings_file_keeps_defaults() {
    let settings: Settings = serde_json::from_str(
        r#"{ "datadog": { "env": "staging" }, "gap_threshold_seconds": 120 }"#,
    )
    .unwrap();

    assert_eq!(settings.datadog.env, "staging");
    assert_eq!(settings.datadog.site, "datadoghq.com");
    assert_eq!(settings.gap_threshold_seconds, 120);
    assert_eq!(settings.lookback_days, 7);
    assert_eq!(settings.retry.max_attempts, 3);
}

#[test]
fn command_line_overrides_file() {
    let cli = Cli::parse_from([
        "tripmap",
        "--dd-api-key",
        "api",
        "--dd-app-key",
        "app",
        "map",
        "6f1c1f9e-2a5b-4a5e-9a47-5b1f0e6f3c11",
        "--gap-threshold",
        "60",
    ]);

    let args = match &cli.command {
        Command::Map(args) => args,
        other => panic!("unexpected command {:?}", other),
    };

    let settings = Settings::default()
        .merge_credentials(&cli.credentials)
        .merge_map_args(args);

    assert_eq!(settings.datadog.api_key.as_deref(), Some("api"));
    assert_eq!(settings.gap_threshold(), chrono::Duration::seconds(60));
    assert!(settings.validate_datadog().is_ok());
}

#[test]
fn invalid_settings_are_rejected() {
    let mut settings = Settings::default();
    assert!(settings.validate().is_ok());
    assert!(settings.validate_datadog().is_err());

    settings.gap_threshold_seconds = 0;
    assert_eq!(settings.validate().unwrap_err().code, 102);
}

#[test]
fn missing_explicit_settings_file_is_an_error() {
    assert!(Settings::load(Some(Path::new("/nonexistent/tripmap.json"))).is_err());
}
