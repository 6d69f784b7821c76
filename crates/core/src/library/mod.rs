//! Completed-job library (`library.json`).

mod store;

pub use store::{LibraryRecord, LibraryStore};
