//! Static HTML tearsheets for completed runs, and publishing them to blob
//! storage.

pub mod publish;
pub mod render;
pub mod storage;

pub use publish::{ReportError, ReportPublisher, REPORT_CONTENT_TYPE};
pub use render::{build_report_html, make_polyline, ReportInput};
pub use storage::{LocalStorage, ReportStorage, StorageError, SupabaseStorage};
