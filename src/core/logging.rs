use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a global fmt subscriber at `level`.
///
/// Returns `false` when a global subscriber was already set, which makes the
/// call safe to repeat from tests and embedding applications.
pub fn init_logging(level: Level) -> bool {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// Parse a level name such as `"debug"` or `"WARN"`, defaulting to INFO.
pub fn parse_level(name: &str) -> Level {
    name.parse::<Level>().unwrap_or(Level::INFO)
}
