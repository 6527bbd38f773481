//! Storage ports the editing coordinator works against.

use thiserror::Error;

use crate::models::{Attachment, Entry};
use crate::template::Template;

/// Errors surfaced by vault store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The template handed to encoding is not known to the store.
    #[error("unknown template {0}")]
    UnknownTemplate(String),
    /// The record is malformed beyond what decoding can tolerate.
    #[error("malformed entry {0}")]
    MalformedEntry(String),
    /// Anything the storage backend itself failed at.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Read and transform surface of a vault, as needed while editing one entry.
///
/// Implementations are shared across the owning task and blocking workers,
/// so every method takes `&self`.
pub trait VaultStore: Send + Sync {
    /// List the templates an entry can be shaped by.
    ///
    /// In template mode the vault's template records are themselves being
    /// edited and the list contains only the designer template.
    fn templates(&self, template_mode: bool) -> Result<Vec<Template>, StoreError>;

    /// Resolve the template an entry was created from, if it names one.
    fn template_of(&self, entry: &Entry) -> Option<Template>;

    /// Normalize a raw record against its template for editing.
    fn decode_entry(&self, entry: &Entry) -> Result<Entry, StoreError>;

    /// Shape a record against a template before it is persisted.
    fn encode_entry(&self, entry: &Entry, template: &Template) -> Result<Entry, StoreError>;

    /// Access the vault's shared binary pool.
    fn attachment_pool(&self) -> &dyn AttachmentPool;
}

/// Reference-counted view of the vault's shared binary pool.
pub trait AttachmentPool: Send + Sync {
    /// Whether any persisted entry still references the attachment's binary.
    fn is_referenced(&self, attachment: &Attachment) -> bool;

    /// Drop the attachment's binary unless something still references it.
    ///
    /// Returns true when the binary was actually removed.
    fn remove_if_unreferenced(&self, attachment: &Attachment) -> bool;
}
