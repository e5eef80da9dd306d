//! Canonical request, response, and streaming types
//!
//! Everything the gateway and its callers exchange is expressed in these
//! types; adapters translate them to and from each back end's wire format.

mod message;
mod request;
mod response;
mod stream;

pub use message::{ChatMessage, Role};
pub use request::{GenConfig, GenerationRequest};
pub use response::{FinishReason, GenerationResponse, TokenUsage};
pub use stream::StreamChunk;
