pub mod error;
pub mod openai;
pub mod schema;
pub mod util;

pub use error::{AiError, Result};
pub use openai::OpenAi;
pub use schema::StructuredOutput;
pub use util::{extract_json_object, strip_code_blocks, truncate_to_char_boundary};
