pub mod db;
pub mod error;

pub use db::RunStore;
pub use error::StoreError;
