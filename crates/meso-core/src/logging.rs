use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the stderr subscriber shared by every tool.
///
/// `RUST_LOG` wins when set; otherwise `meso_core` and the calling tool log
/// at `info` (or `debug` when `verbose`).
pub fn init(tool: &str, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meso_core={level},{tool}={level}")));

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    // A second init (tests, repeated calls) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}
