pub mod error;
pub mod gemini;
pub mod util;

pub use error::{AiError, Result};
pub use gemini::{Candidate, Content, GenerateContentResponse, Gemini, Part};
pub use util::{strip_code_blocks, truncate_to_char_boundary};
