//! Shared data types for entries and their editable projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::otp::OtpElement;

/// Standard KDBX field names.
pub const TITLE_FIELD: &str = "Title";
pub const USERNAME_FIELD: &str = "UserName";
pub const PASSWORD_FIELD: &str = "Password";
pub const URL_FIELD: &str = "URL";
pub const NOTES_FIELD: &str = "Notes";

/// Field holding the otpauth URI, as written by most KeePass clients.
pub const OTP_FIELD: &str = "otp";

/// Field recording which template an entry was created from.
pub const TEMPLATE_REF_FIELD: &str = "_etm_template_uuid";

/// Field holding an app association written by mobile autofill clients.
pub const APPLICATION_ID_FIELD: &str = "AndroidApp";

/// Returns true for field names with dedicated slots on [`EntryInfo`].
pub fn is_standard_field(name: &str) -> bool {
    matches!(
        name,
        TITLE_FIELD | USERNAME_FIELD | PASSWORD_FIELD | URL_FIELD | NOTES_FIELD
    )
}

/// A single named attribute of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub protected: bool,
}

impl Field {
    /// Create an unprotected field.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            protected: false,
        }
    }

    /// Create a field whose value is stored protected.
    pub fn protected(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            protected: true,
        }
    }
}

/// Icon carried by an entry, either a builtin id or a custom image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconImage {
    pub id: u32,
    pub custom_uuid: Option<String>,
}

impl IconImage {
    /// Reference a builtin icon by id.
    pub fn standard(id: u32) -> Self {
        Self {
            id,
            custom_uuid: None,
        }
    }

    /// Reference a custom icon stored in the vault.
    pub fn custom(uuid: impl Into<String>) -> Self {
        Self {
            id: 0,
            custom_uuid: Some(uuid.into()),
        }
    }
}

impl Default for IconImage {
    fn default() -> Self {
        Self::standard(0)
    }
}

/// Handle into the vault's shared binary pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryKey(pub u64);

/// A named reference to pooled binary content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub file_name: String,
    pub binary: BinaryKey,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, binary: BinaryKey) -> Self {
        Self {
            file_name: file_name.into(),
            binary,
        }
    }
}

/// A group (folder) an entry lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub uuid: String,
    pub name: String,
}

/// Raw entry record as stored in the vault.
///
/// Fields keep their storage order; [`crate::store::VaultStore::decode_entry`]
/// normalizes that order against the entry's template before editing.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub uuid: String,
    pub fields: Vec<Field>,
    pub attachments: Vec<Attachment>,
    pub icon: IconImage,
    pub expires: Option<DateTime<Utc>>,
    /// Uuid of the template this entry was built from, if any.
    pub template_ref: Option<String>,
}

impl Entry {
    /// Create an empty entry with a fresh uuid.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            fields: Vec::new(),
            attachments: Vec::new(),
            icon: IconImage::default(),
            expires: None,
            template_ref: None,
        }
    }

    /// Build a fresh entry carrying everything from an editable projection.
    pub fn from_info(info: &EntryInfo) -> Self {
        let mut entry = Self::new();
        if !info.uuid.is_empty() {
            entry.uuid = info.uuid.clone();
        }
        entry.apply_info(info);
        entry
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field value by name.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value.as_str())
    }

    /// Insert or overwrite a field, keeping its position when it exists.
    pub fn set_field(&mut self, name: &str, value: &str, protected: bool) {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.value = value.to_string();
                field.protected = protected;
            }
            None => self.fields.push(Field {
                name: name.to_string(),
                value: value.to_string(),
                protected,
            }),
        }
    }

    /// Remove a field by name.
    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let index = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(index))
    }

    /// Project the entry into its editable form.
    ///
    /// With `include_sensitive` unset, the password and protected custom
    /// field values are blanked out.
    pub fn to_info(&self, include_sensitive: bool) -> EntryInfo {
        let value_of = |name: &str| self.field_value(name).unwrap_or_default().to_string();

        let password = if include_sensitive {
            value_of(PASSWORD_FIELD)
        } else {
            String::new()
        };

        let custom_fields = self
            .fields
            .iter()
            .filter(|f| !is_standard_field(&f.name))
            .filter(|f| f.name != OTP_FIELD && f.name != TEMPLATE_REF_FIELD)
            .map(|f| {
                if f.protected && !include_sensitive {
                    Field::protected(f.name.clone(), "")
                } else {
                    f.clone()
                }
            })
            .collect();

        EntryInfo {
            uuid: self.uuid.clone(),
            title: value_of(TITLE_FIELD),
            username: value_of(USERNAME_FIELD),
            password,
            url: value_of(URL_FIELD),
            notes: value_of(NOTES_FIELD),
            expires: self.expires,
            icon: self.icon.clone(),
            custom_fields,
            attachments: self.attachments.clone(),
            otp: self
                .field_value(OTP_FIELD)
                .and_then(|uri| uri.parse().ok()),
        }
    }

    /// Write an editable projection back into the entry.
    ///
    /// Standard fields, custom fields, attachments, icon, expiry and otp are
    /// all replaced; the uuid and template reference are kept.
    pub fn apply_info(&mut self, info: &EntryInfo) {
        let mut fields = Vec::with_capacity(info.custom_fields.len() + 6);
        fields.push(Field::new(TITLE_FIELD, info.title.clone()));
        fields.push(Field::new(USERNAME_FIELD, info.username.clone()));
        fields.push(Field::protected(PASSWORD_FIELD, info.password.clone()));
        fields.push(Field::new(URL_FIELD, info.url.clone()));
        fields.push(Field::new(NOTES_FIELD, info.notes.clone()));
        for field in &info.custom_fields {
            if !is_standard_field(&field.name) {
                fields.push(field.clone());
            }
        }
        if let Some(otp) = &info.otp {
            fields.push(Field::protected(OTP_FIELD, otp.otpauth_uri()));
        }
        self.fields = fields;

        self.attachments = info.attachments.clone();
        self.icon = info.icon.clone();
        self.expires = info.expires;
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

/// Editable projection of an entry, the unit the editing surface works on.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub uuid: String,
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
    pub expires: Option<DateTime<Utc>>,
    pub icon: IconImage,
    pub custom_fields: Vec<Field>,
    pub attachments: Vec<Attachment>,
    pub otp: Option<OtpElement>,
}

impl EntryInfo {
    /// Create a blank projection for a brand new entry.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            title: String::new(),
            username: String::new(),
            password: String::new(),
            url: String::new(),
            notes: String::new(),
            expires: None,
            icon: IconImage::default(),
            custom_fields: Vec::new(),
            attachments: Vec::new(),
            otp: None,
        }
    }

    /// Add a custom field unless one with the same name already exists.
    pub fn add_unique_field(&mut self, field: Field) {
        if !self.custom_fields.iter().any(|f| f.name == field.name) {
            self.custom_fields.push(field);
        }
    }

    /// Fold an external search association into the projection.
    ///
    /// Only empty slots are filled; values already present on the entry win.
    pub fn merge_search_info(&mut self, search: &SearchInfo) {
        if let Some(domain) = &search.web_domain {
            if self.url.is_empty() {
                let scheme = search.web_scheme.as_deref().unwrap_or("https");
                self.url = format!("{scheme}://{domain}");
            }
            if self.title.is_empty() {
                self.title = domain.clone();
            }
        } else if let Some(application_id) = &search.application_id {
            self.add_unique_field(Field::new(APPLICATION_ID_FIELD, application_id.clone()));
            if self.title.is_empty() {
                self.title = application_id.clone();
            }
        }
    }

    /// Fold an external registration into the projection.
    ///
    /// The registration's own association replaces any plain search
    /// association, then its credentials overwrite the projection's.
    pub fn merge_register_info(&mut self, register: &RegisterInfo) {
        self.merge_search_info(&register.search_info);
        if let Some(username) = &register.username {
            self.username = username.clone();
        }
        if let Some(password) = &register.password {
            self.password = password.clone();
        }
    }
}

impl Default for EntryInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// External association data describing where a credential request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInfo {
    pub web_domain: Option<String>,
    pub web_scheme: Option<String>,
    pub application_id: Option<String>,
}

/// Credential registration handed over by an external flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterInfo {
    pub search_info: SearchInfo,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::OtpElement;

    fn sample_entry() -> Entry {
        let mut entry = Entry::new();
        entry.set_field(TITLE_FIELD, "mail", false);
        entry.set_field(USERNAME_FIELD, "kay", false);
        entry.set_field(PASSWORD_FIELD, "hunter2", true);
        entry.set_field("PIN", "0000", true);
        entry.set_field("Color", "green", false);
        entry
    }

    #[test]
    fn to_info_projects_standard_fields() {
        let info = sample_entry().to_info(true);
        assert_eq!(info.title, "mail");
        assert_eq!(info.username, "kay");
        assert_eq!(info.password, "hunter2");
        assert_eq!(info.custom_fields.len(), 2);
    }

    #[test]
    fn to_info_blanks_protected_values_when_not_sensitive() {
        let info = sample_entry().to_info(false);
        assert_eq!(info.password, "");
        let pin = info
            .custom_fields
            .iter()
            .find(|f| f.name == "PIN")
            .unwrap();
        assert_eq!(pin.value, "");
        assert!(pin.protected);
        let color = info
            .custom_fields
            .iter()
            .find(|f| f.name == "Color")
            .unwrap();
        assert_eq!(color.value, "green");
    }

    #[test]
    fn apply_info_round_trips() {
        let entry = sample_entry();
        let mut info = entry.to_info(true);
        info.notes = "changed".to_string();
        info.otp = Some(OtpElement::totp("JBSWY3DPEHPK3PXP"));

        let mut updated = entry.clone();
        updated.apply_info(&info);

        assert_eq!(updated.uuid, entry.uuid);
        assert_eq!(updated.field_value(NOTES_FIELD), Some("changed"));
        assert!(updated
            .field_value(OTP_FIELD)
            .is_some_and(|uri| uri.starts_with("otpauth://totp/")));
        assert_eq!(updated.to_info(true).custom_fields, info.custom_fields);
    }

    #[test]
    fn from_info_keeps_projection_uuid() {
        let info = EntryInfo::new();
        let entry = Entry::from_info(&info);
        assert_eq!(entry.uuid, info.uuid);
    }

    #[test]
    fn merge_search_info_fills_empty_slots_only() {
        let mut info = EntryInfo::new();
        info.title = "existing".to_string();
        info.merge_search_info(&SearchInfo {
            web_domain: Some("example.org".to_string()),
            web_scheme: None,
            application_id: None,
        });
        assert_eq!(info.title, "existing");
        assert_eq!(info.url, "https://example.org");
    }

    #[test]
    fn merge_search_info_records_application_id() {
        let mut info = EntryInfo::new();
        info.merge_search_info(&SearchInfo {
            web_domain: None,
            web_scheme: None,
            application_id: Some("org.example.app".to_string()),
        });
        assert_eq!(info.title, "org.example.app");
        assert_eq!(info.custom_fields.len(), 1);
        assert_eq!(info.custom_fields[0].name, APPLICATION_ID_FIELD);
    }

    #[test]
    fn merge_register_info_overrides_credentials() {
        let mut info = EntryInfo::new();
        info.username = "old".to_string();
        info.merge_register_info(&RegisterInfo {
            search_info: SearchInfo {
                web_domain: Some("example.org".to_string()),
                web_scheme: Some("http".to_string()),
                application_id: None,
            },
            username: Some("new".to_string()),
            password: Some("s3cret".to_string()),
        });
        assert_eq!(info.username, "new");
        assert_eq!(info.password, "s3cret");
        assert_eq!(info.url, "http://example.org");
    }
}
