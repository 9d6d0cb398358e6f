use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info", "warn",
/// "lumen_engine=debug,wgpu=warn"). It takes precedence over `RUST_LOG`.
///
/// `write_style` controls ANSI coloring behavior.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,

    /// Level applied to wgpu and its shader translator before any filter is
    /// parsed. Their info output is per-pipeline and drowns buffer traffic.
    pub backend_level: log::LevelFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            backend_level: log::LevelFilter::Warn,
        }
    }
}

const BACKEND_MODULES: [&str; 4] = ["wgpu_core", "wgpu_hal", "wgpu", "naga"];

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// This function is idempotent; subsequent calls are ignored. If another
/// logger was installed first, it is kept and a debug message is emitted
/// through it.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.filter_level(log::LevelFilter::Info);
        for module in BACKEND_MODULES {
            builder.filter_module(module, config.backend_level);
        }

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        }

        builder.write_style(config.write_style);

        match builder.try_init() {
            Ok(()) => log::debug!("logging initialized"),
            Err(e) => log::debug!("logger already installed: {e}"),
        }
    });
}
