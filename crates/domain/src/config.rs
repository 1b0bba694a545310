pub mod errors;
pub mod logging;
pub mod player;
pub mod root;
pub mod server;
pub mod sut;

pub use errors::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use player::PlayerConfig;
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
pub use sut::SutEndpoint;
