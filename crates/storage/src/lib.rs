#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AttemptRepository, AttemptRow, DraftRecord, DraftRepository, InMemoryRepository, Storage,
    StorageError,
};
