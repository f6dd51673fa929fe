//! metaeval-llm: response-generation contract shared by every backend.
//!
//! A backend turns an ordered list of prompts into an equally long, ordered
//! list of responses. This crate holds that contract ([`ResponseGenerator`]),
//! the prompt assembler, backend-family dispatch, the error taxonomy and the
//! hosted provider backends. The local inference backend lives in
//! `metaeval-local`.

pub mod backend;
pub mod error;
pub mod family;
pub mod message;
pub mod remote;

pub use backend::ResponseGenerator;
pub use error::{GenerationError, Result};
pub use family::ModelFamily;
pub use message::{Message, MessageSequence, Role};
pub use remote::{ProviderConfig, RemoteBackend};
