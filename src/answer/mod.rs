//! Answer generation: the gateway seam and grounding-context assembly.

pub mod gateway;
pub mod prompt;

pub use gateway::{AnswerGateway, GenerationParams, RigAnswerGateway};
pub use prompt::{assemble_context, provenance_tag, system_instruction};
