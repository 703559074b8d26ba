//! # lanchat-shared
//!
//! Wire protocol shared between the relay server and its clients.
//!
//! Messages travel as JSON text frames. The inbound and outbound shapes are
//! distinct types: a [`ClientMessage`] may carry base64 file content, a
//! [`RelayMessage`] can only ever carry a [`FileRef`], which has no content
//! field at all.

pub mod constants;
pub mod error;
pub mod protocol;

pub use error::ProtocolError;
pub use protocol::{synthesize_id, ClientMessage, FileRef, FileUpload, RelayMessage};
