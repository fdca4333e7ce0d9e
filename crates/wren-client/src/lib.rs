pub mod client;
pub mod config;
pub mod error;
pub mod rest;
pub mod session;
pub mod timeline;

mod debounce;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use rest::RestClient;
pub use session::{ChatSession, SessionEvent};
pub use timeline::{GroupedMessage, LoadState, Timeline, TimelineSnapshot};
