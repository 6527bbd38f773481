//! KDBX-backed implementation of the vault store ports.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use keepass::config::DatabaseConfig;
use keepass::db::HeaderAttachment;
use keepass::{Database, DatabaseKey};

use crate::models::{
    is_standard_field, Attachment, BinaryKey, Entry, Field, Group, IconImage, NOTES_FIELD,
    OTP_FIELD, PASSWORD_FIELD, TEMPLATE_REF_FIELD, TITLE_FIELD, URL_FIELD, USERNAME_FIELD,
};
use crate::store::{AttachmentPool, StoreError, VaultStore};
use crate::template::{Template, TemplateAttribute, TemplateAttributeKind, DESIGNER_TEMPLATE_UUID};

/// Name of the top-level group whose entries are read as templates.
pub const TEMPLATES_GROUP: &str = "Templates";

/// Field used to persist the expiry timestamp, as RFC 3339 text.
const EXPIRES_FIELD: &str = "_sesame_expires";

/// Field name prefix marking an attachment. The rest of the name is the
/// file name; the value is the decimal index of the binary in the vault's
/// inner header.
pub const ATTACHMENT_FIELD_PREFIX: &str = "_sesame_bin:";

/// Wrapper around a KDBX database whose inner header doubles as the shared
/// attachment binary pool.
pub struct KdbxVault {
    db: Database,
    path: PathBuf,
    key: DatabaseKey,
    /// Header slots freed this session. Slots are tombstoned rather than
    /// shifted out and are never reused, so a key handed out earlier can
    /// never come to name different content.
    freed_binaries: HashSet<usize>,
}

impl KdbxVault {
    /// Open and unlock a KDBX vault.
    pub fn unlock(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let path = path.as_ref();

        let key = DatabaseKey::new().with_password(password);

        let db = Database::open(&mut std::fs::File::open(path)?, key.clone())
            .with_context(|| format!("Failed to open vault: {}", path.display()))?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
            key,
            freed_binaries: HashSet::new(),
        })
    }

    /// Create an empty vault on disk and leave it unlocked.
    pub fn create(path: impl AsRef<Path>, password: &str, name: &str) -> Result<Self> {
        let path = path.as_ref();

        let mut db = Database::new(DatabaseConfig::default());
        db.meta.database_name = Some(name.to_string());

        let vault = Self {
            db,
            path: path.to_path_buf(),
            key: DatabaseKey::new().with_password(password),
            freed_binaries: HashSet::new(),
        };
        vault.save()?;
        Ok(vault)
    }

    /// Save the vault to disk.
    ///
    /// The written copy keeps only the binaries some entry still references;
    /// freed and never-attached slots are compacted away and the stored
    /// references renumbered to match. In-memory keys stay untouched.
    pub fn save(&self) -> Result<()> {
        let mut out = self.db.clone();
        compact_binaries(&mut out);

        let mut file = std::fs::File::create(&self.path)
            .with_context(|| format!("Failed to create vault file: {}", self.path.display()))?;

        out.save(&mut file, self.key.clone())
            .with_context(|| "Failed to save vault")?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn database_name(&self) -> Option<&str> {
        self.db.meta.database_name.as_deref()
    }

    /// Stage binary content in the pool, reusing the slot of identical
    /// content.
    pub fn add_binary(&mut self, data: Vec<u8>) -> BinaryKey {
        if let Some(existing) = self.find_binary(&data) {
            return existing;
        }
        self.db.header_attachments.push(HeaderAttachment {
            flags: 0,
            content: data,
        });
        BinaryKey(self.db.header_attachments.len() as u64 - 1)
    }

    /// Content stored under a pool key.
    pub fn binary(&self, key: BinaryKey) -> Option<&[u8]> {
        let index = key.0 as usize;
        if self.freed_binaries.contains(&index) {
            return None;
        }
        self.db
            .header_attachments
            .get(index)
            .map(|attachment| attachment.content.as_slice())
    }

    /// Look up the key of content already in the pool.
    pub fn find_binary(&self, data: &[u8]) -> Option<BinaryKey> {
        self.db
            .header_attachments
            .iter()
            .enumerate()
            .find(|(index, attachment)| {
                !self.freed_binaries.contains(index) && attachment.content == data
            })
            .map(|(index, _)| BinaryKey(index as u64))
    }

    /// Number of live binaries in the pool.
    pub fn binary_count(&self) -> usize {
        self.db.header_attachments.len() - self.freed_binaries.len()
    }

    fn remove_binary(&mut self, key: BinaryKey) {
        let index = key.0 as usize;
        if let Some(slot) = self.db.header_attachments.get_mut(index) {
            slot.content = Vec::new();
            self.freed_binaries.insert(index);
        }
    }

    /// Get the root group of the vault.
    pub fn root_group(&self) -> Group {
        Group {
            uuid: self.db.root.uuid.to_string(),
            name: self.db.root.name.clone(),
        }
    }

    /// Find a top-level group by name, creating it when missing.
    pub fn ensure_group(&mut self, name: &str) -> Group {
        let found = self.db.root.children.iter().find_map(|node| match node {
            keepass::db::Node::Group(g) if g.name == name => Some(Group {
                uuid: g.uuid.to_string(),
                name: g.name.clone(),
            }),
            _ => None,
        });
        if let Some(group) = found {
            return group;
        }

        let group = keepass::db::Group::new(name);
        let model = Group {
            uuid: group.uuid.to_string(),
            name: group.name.clone(),
        };
        self.db.root.children.push(keepass::db::Node::Group(group));
        model
    }

    /// All entries in the vault, template records included.
    pub fn entries(&self) -> Vec<Entry> {
        let mut entries = Vec::new();
        self.collect_entries(&self.db.root, &mut entries);
        entries
    }

    fn collect_entries(&self, group: &keepass::db::Group, out: &mut Vec<Entry>) {
        for node in &group.children {
            match node {
                keepass::db::Node::Entry(e) => out.push(self.to_model_entry(e)),
                keepass::db::Node::Group(g) => self.collect_entries(g, out),
            }
        }
    }

    /// Find an entry by UUID.
    pub fn find_entry(&self, uuid: &str) -> Option<Entry> {
        self.find_entry_in_group(&self.db.root, uuid)
    }

    fn find_entry_in_group(&self, group: &keepass::db::Group, uuid: &str) -> Option<Entry> {
        for node in &group.children {
            match node {
                keepass::db::Node::Entry(e) if e.uuid.to_string() == uuid => {
                    return Some(self.to_model_entry(e));
                }
                keepass::db::Node::Group(g) => {
                    if let Some(entry) = self.find_entry_in_group(g, uuid) {
                        return Some(entry);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Write an entry into the vault, replacing it in place when it exists
    /// and storing it under `parent` (or the root) when it does not.
    pub fn upsert_entry(&mut self, entry: &Entry, parent: Option<&Group>) -> Result<()> {
        let kentry = self.to_kdbx_entry(entry)?;
        if Self::replace_entry_recursive(&mut self.db.root, &kentry) {
            return Ok(());
        }

        if let Some(group) = parent {
            if let Some(found) = Self::find_group_mut(&mut self.db.root, &group.uuid) {
                found.children.push(keepass::db::Node::Entry(kentry));
                return Ok(());
            }
            tracing::warn!("Parent group {} not found, storing under root", group.name);
        }
        self.db.root.children.push(keepass::db::Node::Entry(kentry));
        Ok(())
    }

    /// Persist a finished save payload.
    ///
    /// An absent `old_entry` stores the new entry under `parent`; a present
    /// one replaces the stored entry in place.
    pub fn apply_save(
        &mut self,
        old_entry: Option<&Entry>,
        new_entry: &Entry,
        parent: Option<&Group>,
    ) -> Result<()> {
        if let Some(old) = old_entry {
            if self.find_entry(&old.uuid).is_none() {
                tracing::warn!("Entry {} vanished during the edit, storing it anew", old.uuid);
            }
        }
        self.upsert_entry(new_entry, parent)
    }

    fn replace_entry_recursive(
        group: &mut keepass::db::Group,
        kentry: &keepass::db::Entry,
    ) -> bool {
        for node in &mut group.children {
            match node {
                keepass::db::Node::Entry(e) if e.uuid == kentry.uuid => {
                    *e = kentry.clone();
                    return true;
                }
                keepass::db::Node::Group(g) => {
                    if Self::replace_entry_recursive(g, kentry) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn find_group_mut<'a>(
        group: &'a mut keepass::db::Group,
        uuid: &str,
    ) -> Option<&'a mut keepass::db::Group> {
        if group.uuid.to_string() == uuid {
            return Some(group);
        }
        for node in &mut group.children {
            if let keepass::db::Node::Group(g) = node {
                if let Some(found) = Self::find_group_mut(g, uuid) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// List the standard template plus every record in the templates group.
    pub fn templates(&self) -> Vec<Template> {
        let mut templates = vec![Template::standard()];
        if let Some(group) = self.template_group() {
            for node in &group.children {
                let keepass::db::Node::Entry(e) = node else {
                    continue;
                };
                templates.push(self.to_template(e));
            }
        }
        templates
    }

    fn template_group(&self) -> Option<&keepass::db::Group> {
        self.db.root.children.iter().find_map(|node| match node {
            keepass::db::Node::Group(g) if g.name == TEMPLATES_GROUP => Some(g),
            _ => None,
        })
    }

    /// Resolve the template an entry references, if the vault still has it.
    pub fn template_for(&self, entry: &Entry) -> Option<Template> {
        let wanted = entry.template_ref.as_deref()?;
        self.templates().into_iter().find(|t| t.uuid == wanted)
    }

    /// Normalize a raw record against its template for editing.
    ///
    /// A dangling template reference degrades to the standard template.
    pub fn decode_entry(&self, entry: &Entry) -> Entry {
        let template = self.template_for(entry).unwrap_or_else(Template::standard);
        shape_entry(entry, &template)
    }

    /// Shape a record against a template before it is persisted.
    pub fn encode_entry(&self, entry: &Entry, template: &Template) -> Result<Entry, StoreError> {
        let known = template.is_standard()
            || template.uuid == DESIGNER_TEMPLATE_UUID
            || self.templates().iter().any(|t| t.uuid == template.uuid);
        if !known {
            return Err(StoreError::UnknownTemplate(template.uuid.clone()));
        }

        let mut shaped = shape_entry(entry, template);
        shaped.template_ref =
            if template.is_standard() || template.uuid == DESIGNER_TEMPLATE_UUID {
                None
            } else {
                Some(template.uuid.clone())
            };
        Ok(shaped)
    }

    /// Read a template record. Each custom field declares one attribute:
    /// the name is the label, the value names the kind.
    fn to_template(&self, ke: &keepass::db::Entry) -> Template {
        let mut labels: Vec<&String> = ke
            .fields
            .keys()
            .filter(|k| !is_internal_field(k))
            .collect();
        labels.sort();

        let mut attributes = Vec::with_capacity(labels.len());
        for label in labels {
            let Some(value) = ke.fields.get(label.as_str()) else {
                continue;
            };
            let kind = ke
                .get(label)
                .and_then(TemplateAttributeKind::from_name)
                .unwrap_or(TemplateAttributeKind::Text);
            attributes.push(TemplateAttribute {
                label: label.clone(),
                kind,
                protected: matches!(value, keepass::db::Value::Protected(_)),
            });
        }

        Template {
            uuid: ke.uuid.to_string(),
            name: ke.get_title().unwrap_or_default().to_string(),
            attributes,
        }
    }

    /// Convert a keepass::Entry to our Entry model.
    fn to_model_entry(&self, ke: &keepass::db::Entry) -> Entry {
        let mut fields = Vec::new();
        let mut attachments = Vec::new();
        let mut expires = None;
        let mut template_ref = None;

        // Standard fields first so a raw read already lists them up front.
        for name in [
            TITLE_FIELD,
            USERNAME_FIELD,
            PASSWORD_FIELD,
            URL_FIELD,
            NOTES_FIELD,
        ] {
            if let Some(value) = ke.get(name) {
                fields.push(Field {
                    name: name.to_string(),
                    value: value.to_string(),
                    protected: matches!(
                        ke.fields.get(name),
                        Some(keepass::db::Value::Protected(_))
                    ),
                });
            }
        }

        // The rest of the field map is unordered, so sort for determinism.
        let mut extras: Vec<(&String, &keepass::db::Value)> = ke
            .fields
            .iter()
            .filter(|(name, _)| !is_standard_field(name))
            .collect();
        extras.sort_by(|a, b| a.0.cmp(b.0));

        for (name, value) in extras {
            if let Some(file_name) = name.strip_prefix(ATTACHMENT_FIELD_PREFIX) {
                match ke.get(name).and_then(|text| self.resolve_binary(text)) {
                    Some(key) => attachments.push(Attachment::new(file_name, key)),
                    None => tracing::warn!("Attachment {} missing from binary pool", file_name),
                }
                continue;
            }

            let Some(text) = ke.get(name) else {
                continue;
            };
            match name.as_str() {
                TEMPLATE_REF_FIELD => template_ref = Some(text.to_string()),
                EXPIRES_FIELD => {
                    expires = chrono::DateTime::parse_from_rfc3339(text)
                        .ok()
                        .map(|dt| dt.with_timezone(&chrono::Utc));
                }
                _ => fields.push(Field {
                    name: name.clone(),
                    value: text.to_string(),
                    protected: matches!(value, keepass::db::Value::Protected(_)),
                }),
            }
        }

        Entry {
            uuid: ke.uuid.to_string(),
            fields,
            attachments,
            icon: IconImage {
                id: ke.icon_id.map(|id| id as u32).unwrap_or(0),
                custom_uuid: ke.custom_icon_uuid.map(|uuid| uuid.to_string()),
            },
            expires,
            template_ref,
        }
    }

    /// Resolve a stored attachment reference to a live pool key.
    fn resolve_binary(&self, reference: &str) -> Option<BinaryKey> {
        let key = reference.parse().map(BinaryKey).ok()?;
        self.binary(key).map(|_| key)
    }

    /// Convert our Entry model to a keepass::Entry.
    fn to_kdbx_entry(&self, entry: &Entry) -> Result<keepass::db::Entry, StoreError> {
        let uuid = uuid::Uuid::parse_str(&entry.uuid)
            .map_err(|_| StoreError::MalformedEntry(entry.uuid.clone()))?;

        let mut ke = keepass::db::Entry::new();
        ke.uuid = uuid;
        ke.icon_id = Some(entry.icon.id as usize);
        ke.custom_icon_uuid = entry
            .icon
            .custom_uuid
            .as_deref()
            .and_then(|text| uuid::Uuid::parse_str(text).ok());

        for field in &entry.fields {
            let value = if field.protected {
                keepass::db::Value::Protected(field.value.as_bytes().into())
            } else {
                keepass::db::Value::Unprotected(field.value.clone())
            };
            ke.fields.insert(field.name.clone(), value);
        }
        if let Some(template_ref) = &entry.template_ref {
            ke.fields.insert(
                TEMPLATE_REF_FIELD.to_string(),
                keepass::db::Value::Unprotected(template_ref.clone()),
            );
        }
        if let Some(expires) = entry.expires {
            ke.fields.insert(
                EXPIRES_FIELD.to_string(),
                keepass::db::Value::Unprotected(expires.to_rfc3339()),
            );
        }
        for attachment in &entry.attachments {
            if self.binary(attachment.binary).is_none() {
                tracing::warn!(
                    "Attachment {} has no pooled binary, skipped",
                    attachment.file_name
                );
                continue;
            }
            ke.fields.insert(
                format!("{ATTACHMENT_FIELD_PREFIX}{}", attachment.file_name),
                keepass::db::Value::Unprotected(attachment.binary.0.to_string()),
            );
        }

        Ok(ke)
    }

    fn count_binary_references(group: &keepass::db::Group, key: BinaryKey) -> usize {
        let wanted = key.0.to_string();
        let mut count = 0;
        for node in &group.children {
            match node {
                keepass::db::Node::Entry(e) => {
                    count += e
                        .fields
                        .iter()
                        .filter(|(name, value)| {
                            name.starts_with(ATTACHMENT_FIELD_PREFIX)
                                && matches!(
                                    value,
                                    keepass::db::Value::Unprotected(text) if *text == wanted
                                )
                        })
                        .count();
                }
                keepass::db::Node::Group(g) => count += Self::count_binary_references(g, key),
            }
        }
        count
    }
}

/// Fields that never surface as template attributes or custom fields.
fn is_internal_field(name: &str) -> bool {
    is_standard_field(name)
        || name == OTP_FIELD
        || name == TEMPLATE_REF_FIELD
        || name == EXPIRES_FIELD
        || name.starts_with(ATTACHMENT_FIELD_PREFIX)
}

/// Keep only the referenced inner-header binaries, renumbering the stored
/// references to the compacted slots.
fn compact_binaries(db: &mut Database) {
    let mut referenced = Vec::new();
    collect_binary_references(&db.root, &mut referenced);
    referenced.sort_unstable();
    referenced.dedup();
    referenced.retain(|index| *index < db.header_attachments.len());

    let remap: HashMap<usize, usize> = referenced
        .iter()
        .enumerate()
        .map(|(new, old)| (*old, new))
        .collect();

    let slots = std::mem::take(&mut db.header_attachments);
    db.header_attachments = slots
        .into_iter()
        .enumerate()
        .filter(|(index, _)| remap.contains_key(index))
        .map(|(_, attachment)| attachment)
        .collect();
    renumber_references(&mut db.root, &remap);
}

fn collect_binary_references(group: &keepass::db::Group, out: &mut Vec<usize>) {
    for node in &group.children {
        match node {
            keepass::db::Node::Entry(e) => {
                for (name, value) in &e.fields {
                    if !name.starts_with(ATTACHMENT_FIELD_PREFIX) {
                        continue;
                    }
                    if let keepass::db::Value::Unprotected(text) = value {
                        if let Ok(index) = text.parse() {
                            out.push(index);
                        }
                    }
                }
            }
            keepass::db::Node::Group(g) => collect_binary_references(g, out),
        }
    }
}

fn renumber_references(group: &mut keepass::db::Group, remap: &HashMap<usize, usize>) {
    for node in &mut group.children {
        match node {
            keepass::db::Node::Entry(e) => {
                for (name, value) in e.fields.iter_mut() {
                    if !name.starts_with(ATTACHMENT_FIELD_PREFIX) {
                        continue;
                    }
                    let keepass::db::Value::Unprotected(text) = value else {
                        continue;
                    };
                    let mapped = text.parse().ok().and_then(|old: usize| remap.get(&old));
                    if let Some(new) = mapped {
                        *text = new.to_string();
                    }
                }
            }
            keepass::db::Node::Group(g) => renumber_references(g, remap),
        }
    }
}

/// Order an entry's fields template-first.
///
/// Standard fields lead, then the template's declared slots (created empty
/// when missing, with the template's protection), then whatever is left.
fn shape_entry(entry: &Entry, template: &Template) -> Entry {
    let mut shaped = entry.clone();
    let mut fields = Vec::with_capacity(shaped.fields.len() + template.attributes.len());

    for name in [
        TITLE_FIELD,
        USERNAME_FIELD,
        PASSWORD_FIELD,
        URL_FIELD,
        NOTES_FIELD,
    ] {
        match shaped.remove_field(name) {
            Some(field) => fields.push(field),
            None => fields.push(Field {
                name: name.to_string(),
                value: String::new(),
                protected: name == PASSWORD_FIELD,
            }),
        }
    }

    for attribute in &template.attributes {
        if attribute.kind == TemplateAttributeKind::Divider {
            continue;
        }
        match shaped.remove_field(&attribute.label) {
            Some(mut field) => {
                field.protected = attribute.protected;
                fields.push(field);
            }
            None => fields.push(Field {
                name: attribute.label.clone(),
                value: String::new(),
                protected: attribute.protected,
            }),
        }
    }

    fields.append(&mut shaped.fields);
    shaped.fields = fields;
    shaped
}

/// Cheaply clonable handle sharing one unlocked vault.
#[derive(Clone)]
pub struct SharedKdbxVault {
    inner: Arc<RwLock<KdbxVault>>,
}

impl SharedKdbxVault {
    pub fn new(vault: KdbxVault) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vault)),
        }
    }

    /// Read access to the vault, recovering from a poisoned lock.
    pub fn read(&self) -> RwLockReadGuard<'_, KdbxVault> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Write access to the vault, recovering from a poisoned lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, KdbxVault> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl VaultStore for SharedKdbxVault {
    fn templates(&self, template_mode: bool) -> Result<Vec<Template>, StoreError> {
        if template_mode {
            return Ok(vec![Template::designer()]);
        }
        Ok(self.read().templates())
    }

    fn template_of(&self, entry: &Entry) -> Option<Template> {
        self.read().template_for(entry)
    }

    fn decode_entry(&self, entry: &Entry) -> Result<Entry, StoreError> {
        Ok(self.read().decode_entry(entry))
    }

    fn encode_entry(&self, entry: &Entry, template: &Template) -> Result<Entry, StoreError> {
        self.read().encode_entry(entry, template)
    }

    fn attachment_pool(&self) -> &dyn AttachmentPool {
        self
    }
}

impl AttachmentPool for SharedKdbxVault {
    fn is_referenced(&self, attachment: &Attachment) -> bool {
        let vault = self.read();
        if vault.binary(attachment.binary).is_none() {
            return false;
        }
        KdbxVault::count_binary_references(&vault.db.root, attachment.binary) > 0
    }

    fn remove_if_unreferenced(&self, attachment: &Attachment) -> bool {
        let mut vault = self.write();
        if vault.binary(attachment.binary).is_none() {
            return false;
        }
        if KdbxVault::count_binary_references(&vault.db.root, attachment.binary) > 0 {
            return false;
        }
        vault.remove_binary(attachment.binary);
        tracing::info!("Dropped unused attachment binary {}", attachment.file_name);
        true
    }
}
