//! # beacon-protocol
//!
//! Wire protocol definitions for the Beacon presence relay.
//!
//! Every message exchanged with a client is a [`Frame`]: a named event with
//! an optional payload. Frames travel in one of two encodings:
//!
//! - **MessagePack** - length-prefixed binary frames (WebSocket binary messages)
//! - **JSON** - one object per WebSocket text message
//!
//! ## Events
//!
//! - `login` / `get_ip` / `qr_code_generator` - sent by clients
//! - `update_online_count` / `new_msg` / `qrcode_auth_success` - pushed by the server
//! - `get_ip_from_server` / `qr_code_generator_from_server` - replies
//!
//! ## Example
//!
//! ```rust
//! use beacon_protocol::{codec, Frame, Uid};
//!
//! let frame = Frame::login(Uid::Int(42));
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, EncodedFrame, ProtocolError, WireFormat};
pub use frames::{Frame, Uid, PROTOCOL_VERSION};
