//! Domain layer public interface.
//!
//! Value types shared by the client and server halves of the transport:
//! endpoint addresses, call identifiers and typed method descriptors.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod address;
mod call_id;
mod method;

pub use address::Address;
pub use call_id::CallId;
pub use method::{Method, RemoteError};
