//! In-memory tabular store
//!
//! Databases hold tables, tables hold an ordered sequence of string-valued
//! records. Records are only ever appended, patched in place, or filtered out;
//! read order is always insertion order.

pub mod catalog;
pub mod image;
pub mod mutation;
pub mod table;

pub use catalog::{Ensured, TableDescription, TableStore};
pub use image::{DatabaseImage, StoreImage, TableImage};
pub use mutation::{Mutation, MutationRequest};
pub use table::{matches, Conditions, Patch, Record, SchemaOrigin, Table};
