//! Configuration infrastructure
//!
//! The whole pipeline is driven by one `AppConfig` value constructed at
//! process start and passed by reference into every component. Values come
//! from an optional TOML file overlaid with `MEDCODE__`-prefixed environment
//! variables, so the scheduler can inject per-run settings (logical date,
//! credentials) without touching the file.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run date in `YYYY-MM-DD` form, injected by the scheduler.
    pub logical_date: String,

    pub site: SiteConfig,
    pub auth: AuthConfig,
    pub crawl: CrawlConfig,
    pub warehouse: WarehouseConfig,
    pub exempt: ExemptConfig,
    pub logging: LoggingConfig,
}

/// Catalog site endpoints and login form selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Prefix a worklist code is appended to for its detail page.
    pub base_url: String,
    pub login_url: String,
    pub login: LoginSelectors,
}

/// Selector set for the two-step sign-in form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSelectors {
    pub username_field: String,
    pub password_field: String,
    pub next_button: String,
    pub sign_in_button: String,
    /// Element that only renders for a signed-in subscriber; its presence
    /// confirms the session is authenticated.
    pub subscriber_menu: String,
}

/// Credentials for the catalog site. Retrieval from a secret store is the
/// caller's concern; they arrive here through the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub email: String,
    pub password: String,
}

/// Extraction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Worklist codes processed and flushed together.
    pub chunk_size: usize,

    /// Bounded wait for a detail page to present its body.
    pub page_load_timeout_secs: u64,

    /// Bounded wait for a lazily loaded tab to appear.
    pub tab_timeout_secs: u64,

    /// Pause after a tab click so the revealed pane can render.
    pub settle_delay_ms: u64,

    /// Navigation rate cap against the live site.
    pub max_navigations_per_minute: u32,
}

/// Warehouse root and the logical table names under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub root: PathBuf,
    pub procedure_table: String,
    pub modifier_table: String,
    pub ndc_table: String,
    pub exempt_table: String,
}

/// Yearly exempt-code archive source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExemptConfig {
    /// Public listing page holding the per-year archive links.
    pub listing_url: String,

    /// Substring a download link must carry to count for a year.
    pub link_pattern: String,

    /// Case-insensitive substring of the spreadsheet payload name.
    pub payload_pattern: String,

    /// First year the source published an archive.
    pub first_year: i32,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub directory: PathBuf,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://codes.example-coder.com/code/".to_string(),
            login_url: "https://codes.example-coder.com/signin".to_string(),
            login: LoginSelectors::default(),
        }
    }
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username_field: "#userProvidedSignInName".to_string(),
            password_field: "#password".to_string(),
            next_button: "#next".to_string(),
            sign_in_button: "#btnSignIn".to_string(),
            subscriber_menu: "#ctl00_Body_ctl00_mnuSubscription".to_string(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            page_load_timeout_secs: 10,
            tab_timeout_secs: 10,
            settle_delay_ms: 500,
            max_navigations_per_minute: 30,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./warehouse"),
            procedure_table: "procedure_codes".to_string(),
            modifier_table: "procedure_code_modifiers".to_string(),
            ndc_table: "procedure_code_ndc".to_string(),
            exempt_table: "poa_exempt_code".to_string(),
        }
    }
}

impl Default for ExemptConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://www.cms.gov/medicare/coding-billing/icd-10-codes".to_string(),
            link_pattern: "poa-exempt-codes".to_string(),
            payload_pattern: "poaexemptcodes".to_string(),
            first_year: 2021,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            directory: PathBuf::from("./logs"),
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then the optional file named by
    /// `MEDCODE_CONFIG` (or `./medcode.toml`), then environment overrides
    /// like `MEDCODE__AUTH__EMAIL`.
    pub fn load() -> Result<Self> {
        let file = std::env::var("MEDCODE_CONFIG").unwrap_or_else(|_| "medcode".to_string());

        let raw = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix("MEDCODE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        raw.try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Calendar year of the logical run date.
    pub fn logical_year(&self) -> Result<i32> {
        let date = chrono::NaiveDate::parse_from_str(&self.logical_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid logical_date '{}'", self.logical_date))?;
        Ok(chrono::Datelike::year(&date))
    }

    /// File prefix tagged onto every parquet file written by this run.
    pub fn run_file_prefix(&self) -> String {
        format!("{}_", self.logical_date.replace('-', ""))
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate_for_extraction(&self) -> Result<()> {
        if self.logical_date.trim().is_empty() {
            anyhow::bail!("logical_date is required (set MEDCODE__LOGICAL_DATE)");
        }
        if self.auth.email.trim().is_empty() || self.auth.password.trim().is_empty() {
            anyhow::bail!("site credentials are required (set MEDCODE__AUTH__EMAIL / MEDCODE__AUTH__PASSWORD)");
        }
        if self.crawl.chunk_size == 0 {
            anyhow::bail!("crawl.chunk_size must be greater than 0");
        }
        Ok(())
    }

    /// The exempt pipeline runs unauthenticated; only the date is required.
    pub fn validate_for_exempt(&self) -> Result<()> {
        if self.logical_date.trim().is_empty() {
            anyhow::bail!("logical_date is required (set MEDCODE__LOGICAL_DATE)");
        }
        self.logical_year()?;
        Ok(())
    }
}
