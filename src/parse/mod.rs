pub mod shell;
pub mod tokenize;
pub mod types;

pub use shell::{Tokenizer, has_output_redirection};
pub use tokenize::{CommandText, command_text, normalize_command, tokenize};
pub use types::{Operator, Redirection, Segment};
