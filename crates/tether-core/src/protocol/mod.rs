//! Protocol module containing message types, instructions, and the JSON codec.

pub mod codec;
pub mod instruction;
pub mod messages;
pub mod token;

pub use codec::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    CodecError,
};
pub use instruction::{attribute_text, Instruction};
pub use messages::*;
pub use token::TokenCounter;
