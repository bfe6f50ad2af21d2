use clap::Parser;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

use techlog_shipper::cli::Cli;
use techlog_shipper::config_file::ConfigFile;
use techlog_shipper::logging;
use techlog_shipper::platform::{ExitCode, SignalHandler};
use techlog_shipper::runner::{self, RunOutcome};

fn main() {
    // clap exits with status 2 on invalid usage
    let cli = Cli::parse();

    let mut config = match ConfigFile::load_with_custom_path(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("techlog-shipper: Error: {:#}", e);
            ExitCode::InvalidUsage.exit();
        }
    };
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("techlog-shipper: Error: {}", e);
        ExitCode::InvalidUsage.exit();
    }

    let guard = match logging::init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("techlog-shipper: Error: {:#}", e);
            ExitCode::GeneralError.exit();
        }
    };
    if !config.log_dir.as_os_str().is_empty() {
        logging::delete_old_log_files_now(&config.log_dir, config.log_life_span);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let _signal_handler = match SignalHandler::new(Arc::clone(&cancel)) {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("techlog-shipper: Failed to initialize signal handling: {}", e);
            ExitCode::GeneralError.exit();
        }
    };

    info!(root = %config.source_root.display(), workers = config.workers(), "run started");
    let code = match runner::run(config, cli.run_options(), cancel) {
        Ok(RunOutcome::Planned(plan)) => {
            for (idx, files) in plan.iter().enumerate() {
                for file in files {
                    println!(
                        "worker {}\t{}\t{}..{}",
                        idx,
                        file.path.display(),
                        file.offset,
                        file.size
                    );
                }
            }
            ExitCode::Success
        }
        Ok(RunOutcome::Completed(summary)) => {
            eprintln!("{}", summary.stats.format_stats(summary.elapsed));
            ExitCode::from_signal().unwrap_or(ExitCode::Success)
        }
        Err(e) => {
            error!(object = e.object(), title = "Run", "{}", e);
            eprintln!("techlog-shipper: Error: {}", e);
            ExitCode::from_signal().unwrap_or(ExitCode::GeneralError)
        }
    };

    // process::exit skips destructors; flush the log writer first
    drop(guard);
    code.exit();
}
