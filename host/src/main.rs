mod cli;
mod platform;
mod store;
mod transport;
mod w1;

use std::path::Path;

use anyhow::Context;
use bitaxe_logger_common::{boot, Settings};
use clap::Parser;

use crate::cli::Cli;
use crate::platform::HostPlatform;

/// Built-in settings, overridden by the TOML file, overridden by the flags.
fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.settings {
        Some(path) => read_settings(path)?,
        None => Settings::default(),
    };

    if let Some(config) = &cli.config {
        settings.config_path = config.clone();
    }
    if let Some(log) = &cli.log {
        settings.log_path = log.clone();
    }
    if let Some(interval) = cli.interval {
        settings.poll_interval_secs = interval;
    }
    Ok(settings)
}

fn read_settings(path: &Path) -> anyhow::Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing settings in {}", path.display()))
}

/// Boots the logger on the host and runs the polling loop.
///
/// Unlike the device, a failed boot exits with an error instead of parking.
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    log::debug!("{settings:?}");

    let mut platform = HostPlatform::new(
        settings.config_path.clone(),
        cli.store.clone(),
        cli.probes.clone(),
        cli.simulate,
    );
    let mut scheduler = boot(&mut platform, &settings).context("startup failed")?;

    match cli.ticks {
        Some(ticks) => {
            scheduler.run_ticks(ticks);
            Ok(())
        }
        None => scheduler.run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "poll_interval_secs = 60\ncadence = \"fixed-rate\"\nlog_path = \"/tmp/from-file.csv\"\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "bitaxe-logger",
            "--settings",
            path.to_str().unwrap(),
            "--interval",
            "10",
        ]);
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.poll_interval_secs, 10);
        assert_eq!(settings.cadence, bitaxe_logger_common::settings::Cadence::FixedRate);
        assert_eq!(settings.log_path, Path::new("/tmp/from-file.csv"));
        assert_eq!(settings.measurement, "BitaxeLogging");
    }

    #[test]
    fn probe_ids_are_comma_separated() {
        let cli = Cli::parse_from(["bitaxe-logger", "--probes", "28-a,28-b,28-c"]);
        assert_eq!(cli.probes, ["28-a", "28-b", "28-c"]);
    }
}
