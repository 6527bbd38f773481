//! Scriptable in-memory store for driving a session under test.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sesame_core::{Attachment, AttachmentPool, Entry, StoreError, Template, VaultStore};

/// In-memory stand-in for a vault, with a failure switch per operation.
#[derive(Default)]
pub struct TestVault {
    templates: Mutex<Vec<Template>>,
    entry_templates: Mutex<HashMap<String, Template>>,
    fail_templates: AtomicBool,
    fail_decode: AtomicBool,
    fail_encode_for: Mutex<HashSet<String>>,
    referenced: Mutex<HashSet<Attachment>>,
    removal_requests: Mutex<Vec<Attachment>>,
    encoded_with: Mutex<Vec<String>>,
}

impl TestVault {
    pub fn with_templates(templates: Vec<Template>) -> Self {
        let vault = Self::default();
        *vault.templates.lock().unwrap() = templates;
        vault
    }

    /// Associate a stored template with an entry, as a template ref would.
    pub fn set_entry_template(&self, entry: &Entry, template: Template) {
        self.entry_templates
            .lock()
            .unwrap()
            .insert(entry.uuid.clone(), template);
    }

    pub fn fail_template_listing(&self) {
        self.fail_templates.store(true, Ordering::SeqCst);
    }

    pub fn fail_decoding(&self) {
        self.fail_decode.store(true, Ordering::SeqCst);
    }

    /// Make every encode against this template fail.
    pub fn fail_encoding_for(&self, template: &Template) {
        self.fail_encode_for
            .lock()
            .unwrap()
            .insert(template.uuid.clone());
    }

    /// Mark an attachment as still referenced by some other entry.
    pub fn mark_referenced(&self, attachment: &Attachment) {
        self.referenced.lock().unwrap().insert(attachment.clone());
    }

    /// Attachments the session asked the pool to drop.
    pub fn removal_requests(&self) -> Vec<Attachment> {
        self.removal_requests.lock().unwrap().clone()
    }

    /// Template uuids entries were encoded with, in order.
    pub fn encoded_with(&self) -> Vec<String> {
        self.encoded_with.lock().unwrap().clone()
    }
}

impl VaultStore for TestVault {
    fn templates(&self, template_mode: bool) -> Result<Vec<Template>, StoreError> {
        if self.fail_templates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "template backend down"
            )));
        }
        if template_mode {
            return Ok(vec![Template::designer()]);
        }
        Ok(self.templates.lock().unwrap().clone())
    }

    fn template_of(&self, entry: &Entry) -> Option<Template> {
        self.entry_templates
            .lock()
            .unwrap()
            .get(&entry.uuid)
            .cloned()
    }

    fn decode_entry(&self, entry: &Entry) -> Result<Entry, StoreError> {
        if self.fail_decode.load(Ordering::SeqCst) {
            return Err(StoreError::MalformedEntry(entry.uuid.clone()));
        }
        Ok(entry.clone())
    }

    fn encode_entry(&self, entry: &Entry, template: &Template) -> Result<Entry, StoreError> {
        if self.fail_encode_for.lock().unwrap().contains(&template.uuid) {
            return Err(StoreError::UnknownTemplate(template.uuid.clone()));
        }
        self.encoded_with
            .lock()
            .unwrap()
            .push(template.uuid.clone());

        let mut encoded = entry.clone();
        encoded.template_ref = if template.is_standard() {
            None
        } else {
            Some(template.uuid.clone())
        };
        Ok(encoded)
    }

    fn attachment_pool(&self) -> &dyn AttachmentPool {
        self
    }
}

impl AttachmentPool for TestVault {
    fn is_referenced(&self, attachment: &Attachment) -> bool {
        self.referenced.lock().unwrap().contains(attachment)
    }

    fn remove_if_unreferenced(&self, attachment: &Attachment) -> bool {
        self.removal_requests.lock().unwrap().push(attachment.clone());
        !self.referenced.lock().unwrap().contains(attachment)
    }
}
