//! Core models and vault handling for sesame.
//!
//! This crate provides the shared entry/template types, the storage ports
//! used by the editing coordinator, and the KDBX-backed implementation of
//! those ports.

pub mod kdbx;
pub mod models;
pub mod otp;
pub mod store;
pub mod template;

pub use kdbx::{KdbxVault, SharedKdbxVault};
pub use models::{
    Attachment, BinaryKey, Entry, EntryInfo, Field, Group, IconImage, RegisterInfo, SearchInfo,
};
pub use otp::{OtpAlgorithm, OtpElement, OtpKind};
pub use store::{AttachmentPool, StoreError, VaultStore};
pub use template::{Template, TemplateAttribute, TemplateAttributeKind};
