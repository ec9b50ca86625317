pub mod file_store;
pub mod store;

pub use file_store::JsonFileStore;
pub use store::{StateStore, SubjectRecord};
