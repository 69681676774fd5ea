pub mod diff_parser;
pub mod prompt;
pub mod review;

pub use diff_parser::{DiffParser, FileChange, HunkContext};
pub use prompt::{PromptFormatter, ReviewMode};
pub use review::ReviewReport;
