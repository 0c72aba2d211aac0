//! Iterators over the folder hierarchy and the items of a folder.
//!
//! Both iterators skip a record that fails to decode with a recoverable
//! error, logging it with `warn!`. Errors that affect every later read (I/O,
//! poisoned locks) are yielded so the caller can stop.
//!
//! # Example
//! ```no_run
//! # use pst_reader::PstFile;
//! let pst = PstFile::open("archive.pst")?;
//! for folder in pst.folders() {
//!     let folder = folder?;
//!     for item in pst.items(&folder)? {
//!         println!("{:?}", item?.message().subject()?);
//!     }
//! }
//! # Ok::<(), pst_reader::PstError>(())
//! ```

use std::collections::HashSet;
use std::vec::IntoIter;

use log::{trace, warn};

use super::messaging::folder::Folder;
use super::messaging::items::Item;
use super::reader::PstFile;
use super::types::error::Result;
use super::types::models::NodeId;

/// Depth-first, pre-order walk over folders.
///
/// Created by [`PstFile::folders`](crate::PstFile::folders).
pub struct FolderWalk<'a> {
    file: &'a PstFile,
    pending: Vec<NodeId>,
    visited: HashSet<NodeId>,
}

impl<'a> FolderWalk<'a> {
    pub(super) fn new(file: &'a PstFile, root: NodeId) -> Self {
        Self {
            file,
            pending: vec![root],
            visited: HashSet::new(),
        }
    }
}

impl<'a> Iterator for FolderWalk<'a> {
    type Item = Result<Folder>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.pending.pop() {
            // Hierarchy tables can list a folder under more than one parent.
            if !self.visited.insert(id) {
                continue;
            }
            let folder = match self.file.folder(id) {
                Ok(folder) => folder,
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping folder {}: {}", id, e);
                    continue;
                }
                Err(e) => return Some(Err(e)),
            };
            match folder.sub_folder_ids() {
                Ok(children) => {
                    trace!("Folder {} has {} sub folders", id, children.len());
                    self.pending.extend(children.into_iter().rev());
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Cannot list sub folders of {}: {}", id, e)
                }
                Err(e) => return Some(Err(e)),
            }
            return Some(Ok(folder));
        }
        None
    }
}

/// The items of one folder, opened lazily.
///
/// Created by [`PstFile::items`](crate::PstFile::items).
pub struct ItemIter<'a> {
    file: &'a PstFile,
    ids: IntoIter<NodeId>,
}

impl<'a> ItemIter<'a> {
    pub(super) fn new(file: &'a PstFile, ids: Vec<NodeId>) -> Self {
        Self {
            file,
            ids: ids.into_iter(),
        }
    }

    /// Number of items not yet yielded, skipped ones included.
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}

impl<'a> Iterator for ItemIter<'a> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            match self.file.item(id) {
                Ok(item) => return Some(Ok(item)),
                Err(e) if e.is_recoverable() => warn!("Skipping item {}: {}", id, e),
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
