use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn";

/// Installs the global subscriber
///
/// `RUST_LOG` selects the filter, `LOG_FORMAT` one of `full`, `compact`, `json`.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let res = if cfg!(test) || format == "compact" {
        builder.compact().try_init()
    } else if format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = res {
        eprintln!("Logging already initialized: {}", e);
    }
}
