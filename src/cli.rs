// Command-line interface definitions. Flags override settings.yaml values.

use clap::Parser;
use std::path::PathBuf;

use crate::config::ShipperConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "techlog-shipper")]
#[command(about = "Ship technology journal logs into a search index, resuming from stored checkpoints")]
#[command(
    long_about = "Ship technology journal logs into a search index, resuming from stored checkpoints\n\nEvery run scans the source root once, ships whatever was appended since the\nlast committed position of each file and exits. Schedule it periodically.\n\nCOMMON EXAMPLES:\n  techlog-shipper --config conf/settings.yaml\n  techlog-shipper --maxdop 4 --root /var/log/1c/techlog\n  techlog-shipper --dry-run"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Settings file (default: ./conf/settings.yaml, then the user config directory)
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of parallel workers (0 = one per CPU). Overrides `maxdop`.
    #[arg(short = 'j', long = "maxdop", value_name = "N")]
    pub maxdop: Option<usize>,

    /// Source root holding <process>/<YYMMDDHH>.log files. Overrides `patch`.
    #[arg(long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// List the files that would be shipped without locking or publishing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Keep checkpoint entries of files that no longer exist
    #[arg(long = "no-prune")]
    pub no_prune: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded settings
    pub fn apply(&self, config: &mut ShipperConfig) {
        if let Some(maxdop) = self.maxdop {
            config.maxdop = maxdop;
        }
        if let Some(root) = &self.root {
            config.source_root = root.clone();
        }
    }

    pub fn run_options(&self) -> crate::runner::RunOptions {
        crate::runner::RunOptions {
            dry_run: self.dry_run,
            prune: !self.no_prune,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::try_parse_from([
            "techlog-shipper",
            "--maxdop",
            "3",
            "--root",
            "/srv/logs",
            "--dry-run",
        ])
        .unwrap();

        let mut config = ShipperConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.maxdop, 3);
        assert_eq!(config.source_root, PathBuf::from("/srv/logs"));

        let options = cli.run_options();
        assert!(options.dry_run);
        assert!(options.prune);
    }

    #[test]
    fn test_defaults_leave_config_alone() {
        let cli = Cli::try_parse_from(["techlog-shipper", "--no-prune"]).unwrap();
        let mut config = ShipperConfig {
            maxdop: 8,
            ..Default::default()
        };
        cli.apply(&mut config);
        assert_eq!(config.maxdop, 8);
        assert!(!cli.run_options().prune);
    }

    #[test]
    fn test_rejects_bad_number() {
        assert!(Cli::try_parse_from(["techlog-shipper", "--maxdop", "many"]).is_err());
    }
}
