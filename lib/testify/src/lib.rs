mod canned;
mod socket;
mod temp;
pub mod wait;

// re-export
pub use canned::{CannedServer, CannedServerBuilder};
pub use socket::next_addr;
pub use temp::temp_dir;
