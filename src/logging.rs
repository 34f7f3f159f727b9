//! Tracing subscriber setup for the `gene-chat` binary.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "gene_chat=info,chat_api=warn,conversation_store=warn";

/// Filter from `directives`, falling back to [`DEFAULT_FILTER`] when they are
/// missing or do not parse.
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    match directives.map(EnvFilter::try_new) {
        Some(Ok(filter)) => filter,
        Some(Err(error)) => {
            eprintln!("WARN: GENE_CHAT_LOG is not a valid tracing filter ({error}); using defaults");
            EnvFilter::new(DEFAULT_FILTER)
        }
        None => EnvFilter::new(DEFAULT_FILTER),
    }
}

/// Install the global subscriber, writing to stderr so stdout stays the
/// transcript. Returns `false` if a subscriber was already installed.
pub fn init(directives: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directives))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
