pub mod file_ctx;
pub mod file_flow;

pub use file_ctx::{FileCtx, JobSettings};
pub use file_flow::{resolve_rename_target, sanitize_filename, FileFlow, RenameTarget};
