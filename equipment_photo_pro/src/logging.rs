//! Equipment Photo Pro - Logging

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "equipment_photo_pro=info,photo_pro_auth=info,tower_http=info";
const VERBOSE_FILTER: &str = "equipment_photo_pro=debug,photo_pro_auth=debug,tower_http=debug,info";

/// `RUST_LOG` wins over both defaults
pub fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    })
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool, json: bool) {
    let fmt = tracing_subscriber::fmt::layer()
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(filter(verbose))
            .with(fmt.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter(verbose))
            .with(fmt.compact())
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
