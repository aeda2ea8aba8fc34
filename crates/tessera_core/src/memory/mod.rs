//! # Memory Management
//!
//! Shared allocation primitives used by the storage engine.

mod free_list;

pub use free_list::FreeList;
