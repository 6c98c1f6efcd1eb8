pub mod connection_limit;

pub use connection_limit::{ActiveCall, connection_limit_middleware};
