pub mod bootstrap;
pub mod telemetry;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError, Engine};
pub use telemetry::init_logging;
