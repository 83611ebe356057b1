use std::io::Write;

use colored::*;
use log::LevelFilter;

use crate::error::GeneratorError;

/// Initializes `env_logger` for the binary.
///
/// When `RUST_LOG` is set it governs, and `level` only raises this crate's
/// verbosity above `warn` (the `-v` case). Without it, `level` is the global
/// default and HTTP stack internals are held at `warn` so request churn does
/// not flood the terminal. Output goes to stderr, away from the live counter
/// block.
pub fn init_logger(level: LevelFilter) -> Result<(), GeneratorError> {
    let mut builder = env_logger::Builder::from_default_env();

    let (global, modules) = filters_for(level, env_filter_set());
    if let Some(global) = global {
        builder.filter_level(global);
    }
    for (module, module_level) in modules {
        builder.filter_module(module, module_level);
    }
    builder.target(env_logger::Target::Stderr);

    builder.format(|buf, record| {
        let level = record.level();
        let tag = match level {
            log::Level::Error => level.to_string().red(),
            log::Level::Warn => level.to_string().yellow(),
            log::Level::Info => level.to_string().green(),
            log::Level::Debug => level.to_string().blue(),
            log::Level::Trace => level.to_string().dimmed(),
        };
        writeln!(buf, "[{}] {}", tag, record.args())
    });

    builder.try_init()?;
    Ok(())
}

fn env_filter_set() -> bool {
    std::env::var(env_logger::DEFAULT_FILTER_ENV).is_ok_and(|v| !v.trim().is_empty())
}

/// Global level and per-module overrides layered on top of `RUST_LOG`.
fn filters_for(
    level: LevelFilter,
    env_set: bool,
) -> (Option<LevelFilter>, Vec<(&'static str, LevelFilter)>) {
    if env_set {
        let modules = if level > LevelFilter::Warn {
            vec![("loadgen_core", level)]
        } else {
            Vec::new()
        };
        return (None, modules);
    }

    (
        Some(level),
        vec![
            ("reqwest", LevelFilter::Warn),
            ("hyper", LevelFilter::Warn),
            ("loadgen_core", level),
        ],
    )
}

/// Maps the CLI verbosity flag to a level.
pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { LevelFilter::Warn }
}
