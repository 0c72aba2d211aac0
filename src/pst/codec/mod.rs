//! Codec layer for encryption and compression operations.
//!
//! This module provides the byte-level primitives used by the node database
//! and by the message layer.
//!
//! # Submodules
//!
//! - [`crypto`][]: Block decryption (substitution cipher)
//! - [`compression`][]: Decompression algorithms (zlib blocks, LZFu RTF)

pub mod compression;
pub mod crypto;
