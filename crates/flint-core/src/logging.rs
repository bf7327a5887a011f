//! Structured logging (`[ADDED 4.12]`). Grounded on the teacher's
//! `logging::init_tracing`: an `EnvFilter`, a compact non-ANSI writer to
//! stderr by default, and a `--log-json` switch for a JSON layer. The
//! env var override is `FLINT_LOG`, this project's analogue of the
//! teacher's `QIPU_LOG`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize structured logging for the `flint-note` binary.
pub fn init_tracing(verbose: bool, log_level: Option<&str>, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (verbose, log_level) {
        (true, None) => "flint_core=debug,flint_note=debug",
        (false, None) => "flint_core=warn,flint_note=warn",
        (_, Some(level)) => return init_with_level(level, log_json),
    };
    init_with_level(level, log_json)
}

fn init_with_level(level: &str, log_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("FLINT_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_span_events(
                        tracing_subscriber::fmt::format::FmtSpan::NEW
                            | tracing_subscriber::fmt::format::FmtSpan::CLOSE,
                    ),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
