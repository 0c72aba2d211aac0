//! Node database layer: header, B-trees, blocks and nodes.
//!
//! # Module Organization
//!
//! - [`source`]: Random-access byte sources
//! - [`header`]: Parses the archive header
//! - [`btree`]: Searches the node and block B-trees
//! - [`block`]: Decodes physical blocks and assembles block streams
//! - [`subnode`]: Reads per-node sub-node trees
//! - [`node`]: Lookup services and opened nodes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Header         │ ← header::parse()
//! ├─────────────────┤
//! │  Node B-tree    │ ← NodeIndex::descriptor()
//! │  Block B-tree   │ ← NodeIndex::offset()
//! ├─────────────────┤
//! │  Blocks         │ ← BlockStream (decrypt, inflate, data trees)
//! │  Sub-node trees │ ← NodeIndex::sub_nodes()
//! └─────────────────┘
//! ```

pub mod block;
pub mod btree;
pub mod header;
pub mod node;
pub mod source;
pub mod subnode;
