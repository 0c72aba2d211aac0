//! The messaging layer: folders, messages and the typed item views, plus the
//! codecs for the binary properties they carry.
//!
//! # Submodules
//!
//! - [`folder`][]: folder properties and child enumeration
//! - [`message`][]: messages, recipients and attachments
//! - [`items`][]: appointments, contacts, tasks and distribution lists
//! - [`named`][]: named property resolution
//! - [`conversation`][], [`timezone`][], [`recurrence`][], [`distlist`][]:
//!   binary property codecs
//! - [`time`][]: FILETIME and appointment-minute conversions

pub mod conversation;
pub mod distlist;
pub mod folder;
pub mod items;
pub mod message;
pub mod named;
pub mod recurrence;
pub mod time;
pub mod timezone;
