//! Buds wire protocol: frame envelope, message vocabulary and payload
//! parsers.

pub mod codec;
pub mod msg;
pub mod parser;
