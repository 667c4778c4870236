use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` refines the default filter and
/// `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init() {
    let filter = EnvFilter::from_default_env().add_directive(
        "key_rotation=info"
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );

    if json_requested(std::env::var("LOG_FORMAT").ok().as_deref()) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn json_requested(format: Option<&str>) -> bool {
    matches!(format, Some(f) if f.eq_ignore_ascii_case("json"))
}
