//! Data models for hoard-core

pub mod entity;
pub mod key;

pub use entity::{erase_accessor, Accessor, EntityType, Record};
pub use key::{IntoKey, Key};
