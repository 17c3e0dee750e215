//! LwComm messages and their text wire format:
//!
//! ```ascii
//! <first-line>
//! <Header>: <value>
//! ...
//! <blank line>
//! <raw payload, UTF-8>
//! ```
//!
//! The first line is `ACK <id>`, `NACK <id>`, `HEARTBEAT` or a bare `<id>` for a regular
//!  message. Ids never contain a space, so a bare id can not be confused with an ACK / NACK line.
//!
//! Everything after the first blank line is payload and is taken verbatim, so payloads can
//!  contain blank lines.

pub mod message;
pub mod codec;
