//! Evernote `.enex` exports to OneNote pages.

pub mod enex;
pub mod import;
pub mod onenote;
