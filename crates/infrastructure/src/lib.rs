pub mod in_memory_transport;
#[cfg(unix)]
pub mod socket_transport;

pub use in_memory_transport::*;
#[cfg(unix)]
pub use socket_transport::*;
