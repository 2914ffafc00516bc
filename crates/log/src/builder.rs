//! Logger builder implementation

use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedFmtLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by a successful [`init`].
///
/// Holds the active configuration; the subscriber itself stays installed for
/// the life of the process.
#[derive(Debug)]
#[must_use = "dropping the guard early is harmless but usually a mistake"]
pub struct LoggerGuard {
    config: Config,
}

impl LoggerGuard {
    /// The configuration the subscriber was installed with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Parse the level directive into a filter.
    pub(crate) fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            directive: self.config.level.clone(),
            message: e.to_string(),
        })
    }

    fn fmt_layer(&self) -> BoxedFmtLayer {
        let c = &self.config;
        let base = fmt::layer()
            .with_target(c.target)
            .with_file(c.source)
            .with_line_number(c.source);
        match c.format {
            Format::Pretty => base.pretty().with_ansi(c.ansi).boxed(),
            Format::Compact => base.compact().with_ansi(c.ansi).boxed(),
            Format::Json => base.json().with_ansi(false).boxed(),
        }
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the level directive cannot be parsed
    /// - a global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = self.filter()?;
        let fmt_layer = self.fmt_layer();

        Registry::default()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|_| LogError::AlreadyInitialized)?;

        tracing::debug!(level = %self.config.level, format = ?self.config.format, "logger initialized");
        Ok(LoggerGuard {
            config: self.config,
        })
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// See [`LoggerBuilder::build`].
pub fn init(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Install a test-friendly subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}
