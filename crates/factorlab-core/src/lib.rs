pub mod error;
pub mod format;
pub mod nav;
pub mod series;
pub mod types;
pub mod validation;

pub use error::*;
pub use types::*;
pub use validation::{validate_new_run, NewRun, NewRunForm};
