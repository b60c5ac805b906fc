use once_cell::sync::OnceCell;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

pub const ENV_LOG_ROLL: &str = "RELAY_LOG_ROLL";
pub const ENV_LOG_DIR: &str = "RELAY_LOG_DIR";
pub const ENV_LOG_PREFIX: &str = "RELAY_LOG_PREFIX";
pub const ENV_LOG_ROTATION: &str = "RELAY_LOG_ROTATION";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Rolling file sink settings read from `RELAY_LOG_*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingSettings {
    pub dir: String,
    pub prefix: String,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    /// Unknown values fall back to daily.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }
}

impl RollingSettings {
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if get(ENV_LOG_ROLL).as_deref() != Some("1") {
            return None;
        }
        Some(Self {
            dir: get(ENV_LOG_DIR).unwrap_or_else(|| "logs".to_string()),
            prefix: get(ENV_LOG_PREFIX).unwrap_or_else(|| "relay".to_string()),
            rotation: get(ENV_LOG_ROTATION)
                .map(|r| Rotation::parse(&r))
                .unwrap_or(Rotation::Daily),
        })
    }

    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn appender(&self) -> RollingFileAppender {
        match self.rotation {
            Rotation::Hourly => tracing_appender::rolling::hourly(&self.dir, &self.prefix),
            Rotation::Minutely => tracing_appender::rolling::minutely(&self.dir, &self.prefix),
            Rotation::Daily => tracing_appender::rolling::daily(&self.dir, &self.prefix),
        }
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(settings) = RollingSettings::from_env() else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&settings.dir).is_err() {
        eprintln!("failed to create log directory {}", settings.dir);
    }
    let (nb, guard) = tracing_appender::non_blocking(settings.appender());
    let _ = FILE_GUARD.set(guard);
    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(nb)
        .with_filter(file_filter);
    let _ = registry.with(file_layer).try_init();
    tracing::info!(
        directory = %settings.dir,
        prefix = %settings.prefix,
        rotation = ?settings.rotation,
        "rolling log file enabled"
    );
}
