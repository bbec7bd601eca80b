pub mod config;
pub mod logging;
pub mod retry;
pub mod wait;

pub use config::Environment;
pub use logging::setup_logging;
pub use retry::RetryConfig;
pub use wait::wait_for_resource;
