//! Tracing setup shared by the pollwatch binaries.

mod subscriber;

pub use subscriber::init;
