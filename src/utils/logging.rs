//! Process-wide logger setup.

use log::LevelFilter;

/// Installs `env_logger` at `info`, letting `RUST_LOG` override per module.
///
/// Safe to call more than once; later calls are ignored so tests and
/// embedding hosts can both initialize.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .is_test(cfg!(test))
        .try_init();
}
