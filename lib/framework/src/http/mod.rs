mod serve;

pub use serve::{Serve, WithGracefulShutdown, serve};
