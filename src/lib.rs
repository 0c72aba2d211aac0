//! # pst-reader
//!
//! A read-only decoder for Personal Folders (`.pst`) and Offline Folders
//! (`.ost`) archives, in the ANSI, Unicode and 4K-page layouts.
//!
//! The archive is read in layers: the node database (header, B-trees,
//! blocks, sub-node trees), the lists-tables-properties layer on top of it
//! (heaps, BTree-on-heap, property and table contexts), and the messaging
//! layer (folders, messages, attachments and the typed item views).
//!
//! Decoding is lazy: opening a file only reads its header and the named
//! property map, and every other structure is read when first asked for.
pub mod pst;

// Re-export the main types for convenience
pub use pst::{
    format::{
        header::PstHeader,
        node::{Node, NodeContext, NodeIndex},
        source::{ByteRangeReader, LockedReader},
    },
    iter::{FolderWalk, ItemIter},
    ltp::value::{PropertyCell, RowRecord},
    messaging::{
        folder::Folder,
        items::{Appointment, Contact, DistList, Item, Task},
        message::{Attachment, Message, Recipient},
        named::NamedPropertyMap,
    },
    types::{
        kinds::ItemKind,
        models::{DescriptorEntry, NodeId, OffsetEntry, PstVariant},
        properties::PropertyType,
    },
    OpenOptions, PstError, PstFile, Result,
};
