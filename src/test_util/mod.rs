//! This module contains utilities that are useful for testing code based on LwComm functionality.
//!  They are used for testing LwComm itself, but they are also exported for application testing.

pub mod node;
pub mod transport;
