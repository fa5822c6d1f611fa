pub mod config;
pub mod envelope;
pub mod messages;

pub use config::*;
pub use envelope::*;
pub use messages::*;
