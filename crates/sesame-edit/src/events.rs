//! Payload types carried on the session's channels.

use std::path::PathBuf;

use sesame_core::{Attachment, Entry, EntryInfo, Field, Group, Template};

use crate::attachments::EntryAttachmentState;

/// Result of a template/entry load: the selectable templates, the template
/// the session resolved, and the editable projection (absent for a brand
/// new entry).
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatesEntry {
    pub templates: Vec<Template>,
    pub template: Template,
    pub entry_info: Option<EntryInfo>,
}

/// Request for the editing surface to hand back its current projection.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate {
    pub entry: Option<Entry>,
    pub parent: Option<Group>,
}

/// Finished save payload, ready to be persisted.
///
/// `old_entry` is absent when the session saved a brand new entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySave {
    pub old_entry: Option<Entry>,
    pub new_entry: Entry,
    pub parent: Option<Group>,
}

/// A custom field edit; an absent side marks an addition or a removal.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdition {
    pub old_field: Option<Field>,
    pub new_field: Option<Field>,
}

/// Request to build an attachment from a file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentBuild {
    pub source: PathBuf,
    pub file_name: String,
}

/// Request to start streaming a built attachment into the vault.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentUpload {
    pub source: PathBuf,
    pub attachment: Attachment,
}

/// A loaded binary preview, with the scroll position to restore.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPosition {
    pub state: EntryAttachmentState,
    pub position: f32,
}
