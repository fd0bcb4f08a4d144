pub mod adapters;
pub mod contracts;
pub mod executor;
pub mod socket;
pub mod transport;

pub use adapters::*;
pub use contracts::*;
pub use executor::*;
pub use socket::*;
pub use transport::*;
