/// Logging initialization: tracing-subscriber fmt → stderr, filtered by
/// `RUST_LOG` when set. Called once at the start of `InboxApp::new()`;
/// repeated init attempts are ignored so embedding hosts and tests can both
/// construct apps freely.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inbox_core=debug,info".into()),
        )
        .try_init();
}
