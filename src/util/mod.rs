pub mod logging;

pub use logging::{init_from_env, init_logging, json_from_env, parse_level, LoggingConfig};
