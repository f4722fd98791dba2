//! affiliate-export
//!
//! Exports the player hierarchy below one root affiliate to a spreadsheet.
//!
//! # Usage
//!
//! ```bash
//! AFFILIATE_EXPORT_PASSWORD=... affiliate-export AcmeAffiliate
//! affiliate-export -d staging --engine plain AcmeAffiliate
//! ```

use std::io::IsTerminal;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use affiliate_export::cli::{CliInterface, EXIT_CANCELLED, EXIT_FAILURE, EXIT_OK};
use affiliate_export::error::Result;
use affiliate_export::export::ExportOutcome;
use affiliate_export::formatter::Colorizer;

/// Application entry point
#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            let colorizer = Colorizer::new(std::io::stderr().is_terminal());
            if e.is_empty_result() {
                eprintln!("{}", colorizer.warning(&format!("No data found: {e}")));
            } else {
                eprintln!("{}", colorizer.error(&e.to_string()));
            }
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

/// Main application logic
///
/// # Returns
/// * `Result<i32>` - Process exit code or error
async fn run() -> Result<i32> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(EXIT_OK);
    }

    let root_key = cli.root_key()?;

    // Ctrl+C cancels at the next batch boundary
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => cancel_clone.cancel(),
            Err(err) => tracing::warn!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    let mut pipeline = cli.build_pipeline(cancel)?;
    cli.print_banner();
    let outcome = pipeline.run(&root_key).await;
    ctrl_c_handle.abort();

    match outcome? {
        ExportOutcome::Completed { artifact, elapsed } => {
            println!("{}", cli.observer().summary(&artifact, elapsed));
            Ok(EXIT_OK)
        }
        ExportOutcome::Cancelled { .. } => Ok(EXIT_CANCELLED),
    }
}

/// Initialize logging to stderr
///
/// `RUST_LOG` wins over the configured level when set.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
