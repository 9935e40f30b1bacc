pub mod schema;

pub use schema::{BusConfig, Config, HostConfig, ModsConfig};
