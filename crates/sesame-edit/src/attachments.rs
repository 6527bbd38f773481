//! Attachment transfer states and the per-session tracker.

use std::collections::HashMap;

use sesame_core::{Attachment, EntryInfo};

/// Which way an attachment is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Upload,
    Download,
}

/// Lifecycle of one attachment transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentProgress {
    Start,
    InProgress,
    Completed,
    Canceled,
    Error,
}

/// Snapshot of one attachment's transfer within the session.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryAttachmentState {
    pub attachment: Attachment,
    pub direction: StreamDirection,
    pub progress: AttachmentProgress,
    /// Scroll position of the preview, when one has been shown.
    pub preview_position: Option<f32>,
}

impl EntryAttachmentState {
    /// Fresh upload state for a just-built attachment.
    pub fn upload(attachment: Attachment) -> Self {
        Self {
            attachment,
            direction: StreamDirection::Upload,
            progress: AttachmentProgress::Start,
            preview_position: None,
        }
    }

    /// Fresh download state for an attachment being fetched for preview.
    pub fn download(attachment: Attachment) -> Self {
        Self {
            attachment,
            direction: StreamDirection::Download,
            progress: AttachmentProgress::Start,
            preview_position: None,
        }
    }

    pub fn with_progress(mut self, progress: AttachmentProgress) -> Self {
        self.progress = progress;
        self
    }

    /// An upload that has not (or not yet) finished.
    pub fn is_unfinished_upload(&self) -> bool {
        self.direction == StreamDirection::Upload && self.progress != AttachmentProgress::Completed
    }
}

/// Latest known transfer state per attachment identity.
///
/// Re-reporting an attachment replaces its previous state, so the tracker
/// never holds two states for the same identity.
#[derive(Debug, Default)]
pub struct AttachmentTracker {
    states: HashMap<Attachment, EntryAttachmentState>,
}

impl AttachmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reported state, replacing any earlier one for the same
    /// attachment. `None` reports leave the map untouched.
    pub fn upsert(&mut self, state: Option<&EntryAttachmentState>) {
        let Some(state) = state else {
            return;
        };
        self.states.insert(state.attachment.clone(), state.clone());
    }

    pub fn get(&self, attachment: &Attachment) -> Option<&EntryAttachmentState> {
        self.states.get(attachment)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All tracked states, for a worker to reason over.
    pub fn snapshot(&self) -> Vec<EntryAttachmentState> {
        self.states.values().cloned().collect()
    }
}

/// Drop attachments whose upload never completed from a projection about
/// to be saved.
pub fn strip_unfinished_uploads(info: &mut EntryInfo, tracked: &[EntryAttachmentState]) {
    info.attachments.retain(|attachment| {
        !tracked
            .iter()
            .any(|state| state.attachment == *attachment && state.is_unfinished_upload())
    });
}
