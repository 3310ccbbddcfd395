//! Channel abstraction: reply delivery targets resolved by name.

pub mod channel;
pub mod console;
pub mod error;
pub mod registry;

pub use channel::{Channel, DispatchConfig};
pub use console::ConsoleChannel;
pub use error::ChannelError;
pub use registry::{ChannelRegistry, ResolvedChannel};
