use crate::common::file_utils;
use crate::config_loader::MasterConfig;
use anyhow::{Context, Result};
use clap::ArgMatches;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

/// Output directory from `--<output_cli_arg_key>`, else `application.output_directory`. Created if missing.
pub fn determine_output_dir(master_config: &MasterConfig, args: &ArgMatches, output_cli_arg_key: &str) -> Result<PathBuf> {
    let dir = match args.try_get_one::<String>(output_cli_arg_key).ok().flatten() {
        Some(path_str) => {
            debug!("  Output directory specified via CLI: {}", path_str);
            PathBuf::from(path_str)
        }
        None => PathBuf::from(&master_config.app_settings.output_directory),
    };
    file_utils::ensure_output_directory(&dir)
        .with_context(|| format!("Failed to prepare output directory '{}'", dir.display()))
}

pub fn duration_arg(args: &ArgMatches, key: &str) -> Option<Duration> {
    args.try_get_one::<u64>(key)
        .ok()
        .flatten()
        .map(|secs| Duration::from_secs(*secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_cli;
    use crate::config_loader::parse_config;
    use tempfile::tempdir;

    #[test]
    fn test_cli_output_overrides_config() {
        let dir = tempdir().unwrap();
        let yaml = format!(
            "application:\n  output_directory: {}\ncapture:\n  backend: {{ type: external_camera, index: 0 }}\n",
            dir.path().join("default").display()
        );
        let config = parse_config(&yaml).unwrap();
        let cli_out = dir.path().join("cli");
        let matches = build_cli()
            .try_get_matches_from(["vidcap", "capture", "--duration", "2", "-o", cli_out.to_str().unwrap()])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(determine_output_dir(&config, sub, "output").unwrap(), cli_out);
        assert!(cli_out.is_dir());
        assert_eq!(duration_arg(sub, "duration"), Some(Duration::from_secs(2)));

        let matches = build_cli().try_get_matches_from(["vidcap", "capture"]).unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(determine_output_dir(&config, sub, "output").unwrap(), dir.path().join("default"));
        assert_eq!(duration_arg(sub, "duration"), None);
    }
}
