//! Entry editing coordinator for sesame.
//!
//! This crate drives one entry-editing session against a vault store: it
//! resolves templates, projects entries into their editable form, tracks
//! attachment transfers and assembles the save payload, while a set of
//! broadcast and request/response channels keeps the editing surface
//! decoupled from the coordination logic.

pub mod attachments;
pub mod channel;
pub mod config;
pub mod events;
pub mod generator;
pub mod session;

pub use attachments::{
    strip_unfinished_uploads, AttachmentProgress, AttachmentTracker, EntryAttachmentState,
    StreamDirection,
};
pub use channel::{EventChannel, EventReceiver, StateChannel, StateReceiver};
pub use config::{EditConfig, GeneratorConfig};
pub use events::{
    AttachmentBuild, AttachmentPosition, AttachmentUpload, EntrySave, EntryUpdate, FieldEdition,
    TemplatesEntry,
};
pub use generator::{generate_password, password_strength};
pub use session::{resolve_template, EntryEditHandle, EntryEditSession};
