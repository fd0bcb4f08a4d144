pub mod actions;
mod classifier;
pub mod coalescer;
pub mod config;
pub mod frame;
pub mod notification;
pub mod persistence;
pub mod reducer;
pub mod state;
pub mod suppression;
pub mod timers;

pub use actions::*;
pub use config::*;
pub use reducer::*;
pub use state::*;

pub use frame::decode_frame;
pub use notification::*;
pub use persistence::*;
pub use timers::*;
