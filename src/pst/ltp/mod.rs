//! Lists, tables and properties layered on nodes.
//!
//! # Submodules
//!
//! - [`heap`]: Heap-on-node allocations and hnid resolution
//! - [`bth`]: BTree-on-heap records
//! - [`property`]: Single-record property contexts
//! - [`table`]: Multi-row table contexts
//! - [`value`]: Property cells and typed accessors

pub mod bth;
pub mod heap;
pub mod property;
pub mod table;
pub mod value;
