use tracing::error;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    // An already installed subscriber stays in place.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Logs a failed command with its whole cause chain, outermost first.
pub fn failure(err: &anyhow::Error) {
    error!(error = %format!("{err:#}"), "command failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn init_twice_keeps_first_subscriber() {
        init(false);
        init(true);
        let err = Err::<(), _>(anyhow::anyhow!("duplicate key"))
            .context("Failed to seed purchase orders")
            .unwrap_err();
        assert_eq!(format!("{err:#}"), "Failed to seed purchase orders: duplicate key");
        failure(&err);
    }
}
