//! FILENAME: core/bom-facts/src/lib.rs
//! Fact-table types shared by the pivot engine and its data loader.
//!
//! The loader owns the table; the pivot engine only ever borrows it.
//!
//! Layers:
//! - `value`: A single scalar in a fact record
//! - `record`: Flat records and the table that holds them

pub mod value;
pub mod record;

pub use value::FactValue;
pub use record::{FactRecord, FactTable};
