//! RESP (REdis Serialization Protocol) replies
//!
//! Replies produced by the command layer are RESP2 frames; the serializer
//! encodes them for whatever transport embeds the engine.

pub mod resp;
pub mod serializer;

pub use resp::RespFrame;
pub use serializer::serialize_resp_frame;
