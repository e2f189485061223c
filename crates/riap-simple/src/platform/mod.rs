//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here rather than being
//! scattered through the transport code.
//!
//! - `process` - subprocess liveness probe
//! - `socket` - connected-socket liveness probe

pub mod process;
pub mod socket;

pub use process::is_process_alive;
pub use socket::is_socket_idle;
