pub mod config;
pub mod liveness;
pub mod lwcomm;
pub mod message;
pub mod sender;
pub mod stats;
pub mod transport;
pub mod util;
pub mod test_util;
