//! End-to-end tests for the KDBX vault adapter.

use chrono::{TimeZone, Utc};
use sesame_core::kdbx::TEMPLATES_GROUP;
use sesame_core::{
    Attachment, AttachmentPool, Entry, EntryInfo, Field, IconImage, KdbxVault, OtpElement,
    SharedKdbxVault, Template, VaultStore,
};
use tempfile::TempDir;

fn temp_vault() -> (TempDir, KdbxVault) {
    let dir = TempDir::new().unwrap();
    let vault = KdbxVault::create(dir.path().join("vault.kdbx"), "test password", "test").unwrap();
    (dir, vault)
}

fn card_template_record(vault: &mut KdbxVault) -> Entry {
    let mut record = Entry::new();
    record.set_field("Title", "Credit Card", false);
    record.set_field("Number", "text", true);
    record.set_field("Valid until", "datetime", false);
    let group = vault.ensure_group(TEMPLATES_GROUP);
    vault.upsert_entry(&record, Some(&group)).unwrap();
    record
}

#[test]
fn round_trip_preserves_projection() {
    let (_dir, mut vault) = temp_vault();

    let binary = vault.add_binary(b"attachment body".to_vec());
    let mut info = EntryInfo::new();
    info.title = "Mail".to_string();
    info.username = "kay".to_string();
    info.password = "hunter2".to_string();
    info.url = "https://mail.example.org".to_string();
    info.notes = "imap only".to_string();
    info.expires = Some(Utc.with_ymd_and_hms(2027, 1, 31, 12, 0, 0).unwrap());
    info.custom_fields.push(Field::protected("PIN", "0000"));
    info.attachments.push(Attachment::new("note.txt", binary));
    info.otp = Some(OtpElement::totp("JBSWY3DPEHPK3PXP"));

    let entry = Entry::from_info(&info);
    vault.upsert_entry(&entry, None).unwrap();
    vault.save().unwrap();

    let read_back = vault.find_entry(&entry.uuid).expect("entry stored");
    assert_eq!(read_back.to_info(true), info);
    assert!(read_back.field("PIN").is_some_and(|f| f.protected));
}

#[test]
fn attachments_survive_save_and_unlock() {
    let (dir, mut vault) = temp_vault();

    // One text payload and one that is not valid UTF-8.
    let image = vec![0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];
    let text = vault.add_binary(b"shared bytes".to_vec());
    let raw = vault.add_binary(image.clone());
    let mut entry = Entry::new();
    entry.set_field("Title", "With files", false);
    entry.attachments.push(Attachment::new("file.txt", text));
    entry.attachments.push(Attachment::new("logo.png", raw));
    vault.upsert_entry(&entry, None).unwrap();
    vault.save().unwrap();
    drop(vault);

    let reopened = KdbxVault::unlock(dir.path().join("vault.kdbx"), "test password").unwrap();
    assert_eq!(reopened.binary_count(), 2);

    let read_back = reopened.find_entry(&entry.uuid).expect("entry stored");
    assert_eq!(read_back.attachments.len(), 2);
    let file = read_back
        .attachments
        .iter()
        .find(|a| a.file_name == "file.txt")
        .expect("text attachment kept");
    assert_eq!(reopened.binary(file.binary), Some(b"shared bytes".as_slice()));
    let logo = read_back
        .attachments
        .iter()
        .find(|a| a.file_name == "logo.png")
        .expect("binary attachment kept");
    assert_eq!(reopened.binary(logo.binary), Some(image.as_slice()));
}

#[test]
fn binary_pool_deduplicates_content() {
    let (_dir, mut vault) = temp_vault();

    let a = vault.add_binary(vec![1, 2, 3]);
    let b = vault.add_binary(vec![1, 2, 3]);
    let c = vault.add_binary(vec![4, 5]);

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(vault.binary_count(), 2);
}

#[test]
fn save_drops_unreferenced_binaries() {
    let (dir, mut vault) = temp_vault();

    let kept = vault.add_binary(b"kept".to_vec());
    vault.add_binary(b"orphan".to_vec());
    let mut entry = Entry::new();
    entry.set_field("Title", "Holder", false);
    entry.attachments.push(Attachment::new("kept.bin", kept));
    vault.upsert_entry(&entry, None).unwrap();
    vault.save().unwrap();

    // The live vault still holds the staged orphan for a later save.
    assert_eq!(vault.binary_count(), 2);
    drop(vault);

    let reopened = KdbxVault::unlock(dir.path().join("vault.kdbx"), "test password").unwrap();
    assert_eq!(reopened.binary_count(), 1);
    let read_back = reopened.find_entry(&entry.uuid).expect("entry stored");
    assert_eq!(
        reopened.binary(read_back.attachments[0].binary),
        Some(b"kept".as_slice())
    );
    assert!(reopened.find_binary(b"orphan").is_none());
}

#[test]
fn custom_icon_round_trips() {
    let (dir, mut vault) = temp_vault();

    let icon_uuid = "11111111-2222-3333-4444-555555555555";
    let mut entry = Entry::new();
    entry.set_field("Title", "Branded", false);
    entry.icon = IconImage::custom(icon_uuid);
    vault.upsert_entry(&entry, None).unwrap();
    vault.save().unwrap();
    drop(vault);

    let reopened = KdbxVault::unlock(dir.path().join("vault.kdbx"), "test password").unwrap();
    let read_back = reopened.find_entry(&entry.uuid).expect("entry stored");
    assert_eq!(read_back.icon.custom_uuid.as_deref(), Some(icon_uuid));
}

#[test]
fn root_group_accepts_new_entries() {
    let (_dir, mut vault) = temp_vault();
    assert_eq!(vault.database_name(), Some("test"));

    let root = vault.root_group();
    assert_eq!(root.name, "Root");

    let mut entry = Entry::new();
    entry.set_field("Title", "Top level", false);
    vault.upsert_entry(&entry, Some(&root)).unwrap();
    assert!(vault.find_entry(&entry.uuid).is_some());
}

#[test]
fn unlock_rejects_wrong_password() {
    let (dir, vault) = temp_vault();
    drop(vault);
    assert!(KdbxVault::unlock(dir.path().join("vault.kdbx"), "nope").is_err());
}

#[test]
fn templates_listing_reads_template_group() {
    let (_dir, mut vault) = temp_vault();
    let record = card_template_record(&mut vault);

    let templates = vault.templates();
    assert_eq!(templates.len(), 2);
    assert!(templates[0].is_standard());

    let card = &templates[1];
    assert_eq!(card.uuid, record.uuid);
    assert_eq!(card.name, "Credit Card");
    let labels: Vec<&str> = card.attributes.iter().map(|a| a.label.as_str()).collect();
    assert_eq!(labels, vec!["Number", "Valid until"]);
    assert!(card.attribute("Number").is_some_and(|a| a.protected));
}

#[test]
fn encode_then_decode_resolves_the_template() {
    let (_dir, mut vault) = temp_vault();
    card_template_record(&mut vault);
    let card = vault.templates()[1].clone();

    let mut entry = Entry::new();
    entry.set_field("Title", "Visa", false);
    entry.set_field("Number", "4111 1111 1111 1111", false);

    let encoded = vault.encode_entry(&entry, &card).unwrap();
    assert_eq!(encoded.template_ref.as_deref(), Some(card.uuid.as_str()));
    assert!(encoded.field("Number").is_some_and(|f| f.protected));
    assert_eq!(encoded.field_value("Valid until"), Some(""));

    vault.upsert_entry(&encoded, None).unwrap();
    let read_back = vault.find_entry(&encoded.uuid).unwrap();
    assert_eq!(vault.template_for(&read_back), Some(card));

    let decoded = vault.decode_entry(&read_back);
    let names: Vec<&str> = decoded.fields.iter().map(|f| f.name.as_str()).collect();
    let number_pos = names.iter().position(|n| *n == "Number").unwrap();
    let until_pos = names.iter().position(|n| *n == "Valid until").unwrap();
    assert!(number_pos < until_pos);
}

#[test]
fn apply_save_inserts_then_updates() {
    let (_dir, mut vault) = temp_vault();
    let logins = vault.ensure_group("Logins");

    let mut info = EntryInfo::new();
    info.title = "forum".to_string();
    let entry = Entry::from_info(&info);
    vault.apply_save(None, &entry, Some(&logins)).unwrap();
    let stored = vault.find_entry(&entry.uuid).expect("entry stored");
    assert_eq!(stored.field_value("Title"), Some("forum"));

    let mut updated = entry.clone();
    updated.set_field("Title", "forum v2", false);
    vault.apply_save(Some(&entry), &updated, None).unwrap();
    let stored = vault.find_entry(&entry.uuid).expect("entry kept");
    assert_eq!(stored.field_value("Title"), Some("forum v2"));
    assert_eq!(vault.entries().len(), 1);
}

#[test]
fn encode_rejects_unknown_template() {
    let (_dir, vault) = temp_vault();
    let foreign = Template {
        uuid: "not-in-this-vault".to_string(),
        name: "Foreign".to_string(),
        attributes: Vec::new(),
    };
    assert!(vault.encode_entry(&Entry::new(), &foreign).is_err());
}

#[test]
fn decode_degrades_dangling_template_ref_to_standard() {
    let (_dir, vault) = temp_vault();
    let mut entry = Entry::new();
    entry.set_field("Title", "Orphan", false);
    entry.template_ref = Some("gone".to_string());

    assert_eq!(vault.template_for(&entry), None);
    let decoded = vault.decode_entry(&entry);
    assert_eq!(decoded.field_value("Title"), Some("Orphan"));
}

#[test]
fn shared_vault_tracks_binary_references() {
    let (_dir, vault) = temp_vault();
    let shared = SharedKdbxVault::new(vault);

    let stored = {
        let mut vault = shared.write();
        let binary = vault.add_binary(b"persisted".to_vec());
        let attachment = Attachment::new("kept.bin", binary);
        let mut entry = Entry::new();
        entry.set_field("Title", "Holder", false);
        entry.attachments.push(attachment.clone());
        vault.upsert_entry(&entry, None).unwrap();
        attachment
    };
    let staged = {
        let mut vault = shared.write();
        Attachment::new("staged.bin", vault.add_binary(b"never saved".to_vec()))
    };

    assert!(shared.is_referenced(&stored));
    assert!(!shared.remove_if_unreferenced(&stored));
    assert!(shared.read().binary(stored.binary).is_some());

    assert!(!shared.is_referenced(&staged));
    assert!(shared.remove_if_unreferenced(&staged));
    assert!(shared.read().binary(staged.binary).is_none());
    // Already gone, nothing left to remove.
    assert!(!shared.remove_if_unreferenced(&staged));

    // A freed slot is never handed out again.
    let fresh = shared.write().add_binary(b"fresh content".to_vec());
    assert_ne!(fresh, staged.binary);
    assert!(shared.read().binary(staged.binary).is_none());
}

#[test]
fn template_mode_lists_only_the_designer() {
    let (_dir, mut vault) = temp_vault();
    card_template_record(&mut vault);
    let shared = SharedKdbxVault::new(vault);

    let designer = shared.templates(true).unwrap();
    assert_eq!(designer.len(), 1);
    assert_eq!(designer[0], Template::designer());

    let normal = shared.templates(false).unwrap();
    assert_eq!(normal.len(), 2);
}
