pub mod models;
pub mod playlist;
pub mod cache;
pub mod transcoder;
pub mod subtitle;
pub mod handler;
pub mod download;
pub mod store;
pub mod bus;
pub mod origin;
pub mod session;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
pub use bus::{Event, EventBus};
pub use origin::Origin;
