//! Logging initialization module
//!
//! Provides a single initialization point for the logging facility.

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output at info level
    Development,
    /// Human-readable output at debug level (`--verbose`)
    Verbose,
    /// JSON structured output for production
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

static INIT_ONCE: Once = Once::new();

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize the logging facility
///
/// This function should be called once at application startup. Output goes
/// to stderr so that stdout stays reserved for command results.
///
/// # Profiles
///
/// - **Development**: Human-readable logs with info level
/// - **Verbose**: Human-readable logs with debug level
/// - **Production**: JSON structured logs with info level
/// - **Test**: Capture mode for test assertions
///
/// # Example
///
/// ```
/// use applisnap_core::logging_facility::{init, Profile};
///
/// init(Profile::Development);
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| match profile {
        Profile::Development => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter_or("applisnap=info"))
                .init();
        }
        Profile::Verbose => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter_or("applisnap=debug"))
                .init();
        }
        Profile::Production => {
            tracing_subscriber::fmt()
                .json()
                .with_writer(std::io::stderr)
                .with_env_filter(filter_or("applisnap=info"))
                .init();
        }
        Profile::Test => {
            // Test capture is initialized separately via init_test_capture()
            tracing_subscriber::registry().init();
        }
    });
}
