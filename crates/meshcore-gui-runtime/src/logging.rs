//! Tracing subscriber setup

/// Install the global fmt subscriber
///
/// DEBUG when `verbose`, INFO otherwise. Returns false if a subscriber was
/// already installed.
pub fn init_logging(verbose: bool) -> bool {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_logging(true);
        assert!(!init_logging(false));
    }
}
