//! Storage module: persistent scratch and the session store.

pub mod scratch;
pub mod store;

pub use scratch::{FileScratch, MemoryScratch, Scratch, ScratchError};
pub use store::{SessionStore, StoreError};
