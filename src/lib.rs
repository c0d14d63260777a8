//! Embedded, per-connection HTTP/1.x protocol engine (read requests, write
//! responses, on one caller-owned byte channel and read buffer)

#![recursion_limit = "100"]

extern crate futures;
extern crate httparse;
extern crate tokio_io;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

pub mod buffer;
pub mod channel;
pub mod chunked;
pub mod egress;
pub mod error;
pub mod ingress;
pub mod message;
pub mod method;
pub mod proto;
pub mod serializer;
pub mod version;

pub use crate::egress::EgressState;
pub use crate::error::Error;
pub use crate::ingress::IngressState;
pub use crate::message::{Headers, Message};
pub use crate::proto::Proto;
pub use crate::version::Version;
