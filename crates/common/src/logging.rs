use tracing_subscriber::EnvFilter;

use crate::config::Configuration;

/// Set up a process-wide `tracing` subscriber, deriving the default filter
/// from `<component>.debug` / `<component>.log.info` configuration keys when
/// `RUST_LOG` isn't set, matching `LoggingInterface::GetLoggingLevelFromConfiguration`.
pub fn init_tracing(config: &Configuration) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new("info");
        for component in ["lunasa", "opbox", "dirman", "kelpie", "net"] {
            if config.get_bool(&format!("{component}.debug"), false) {
                filter = filter.add_directive(format!("kelpie_{component}=debug").parse().unwrap());
            } else if config.get_bool(&format!("{component}.log.info"), false) {
                filter = filter.add_directive(format!("kelpie_{component}=info").parse().unwrap());
            }
        }
        filter
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
