use crate::config_loader::MasterConfig;
use env_logger::{Builder, Env};
use log::LevelFilter;

/// Level from `--debug`, then `application.log_level`, then `info`.
pub fn initialize_logging(config: Option<&MasterConfig>, cli_matches: &clap::ArgMatches) {
    let mut builder = Builder::new();

    let log_level_str = if cli_matches.get_flag("debug") {
        "debug".to_string()
    } else {
        config
            .and_then(|c| c.app_settings.log_level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let (level, recognized) = parse_level(&log_level_str);
    builder.filter_level(level);

    if let Err(e) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}. Logging might not work as expected.", e);
        return;
    }
    if !recognized {
        log::warn!("Unrecognized log level '{}', defaulting to info.", log_level_str);
    }
}

/// Honours `RUST_LOG`, defaulting to `info`. Safe to call more than once.
pub fn basic_env_logging_init() {
    let _ = Builder::from_env(Env::default().default_filter_or("info")).try_init();
}

fn parse_level(level: &str) -> (LevelFilter, bool) {
    match level.to_lowercase().as_str() {
        "off" => (LevelFilter::Off, true),
        "error" => (LevelFilter::Error, true),
        "warn" => (LevelFilter::Warn, true),
        "info" => (LevelFilter::Info, true),
        "debug" => (LevelFilter::Debug, true),
        "trace" => (LevelFilter::Trace, true),
        _ => (LevelFilter::Info, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), (LevelFilter::Debug, true));
        assert_eq!(parse_level("warn"), (LevelFilter::Warn, true));
        assert_eq!(parse_level("loud"), (LevelFilter::Info, false));
    }
}
