pub mod config;

pub use config::{AuthMethod, JumpHost, SessionDescriptor};
