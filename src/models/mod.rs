pub mod file_kind;
pub mod metadata;
pub mod record;
pub mod status;

pub use file_kind::FileKind;
pub use metadata::{Priority, StockMetadata, DEFAULT_KEYWORD_COUNT};
pub use record::{file_name_of, BatchSummary, FileRecord};
pub use status::{EmbedStatus, JobStatus, OutcomeClass};
