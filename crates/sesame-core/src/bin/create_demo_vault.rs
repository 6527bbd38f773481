use keepass::{config::DatabaseConfig, db::HeaderAttachment, db::Node, db::Value, Database, DatabaseKey};
use sesame_core::kdbx::ATTACHMENT_FIELD_PREFIX;
use std::fs::File;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::new(DatabaseConfig::default());
    db.meta.database_name = Some("sesame demo".to_string());
    db.meta.database_description = Some("A demo vault for the sesame editing crates".to_string());

    // A group with a couple of plain logins
    let mut logins = keepass::db::Group::new("Logins");

    let mut mail = keepass::db::Entry::new();
    mail.fields.insert("Title".to_string(), Value::Unprotected("Mail".to_string()));
    mail.fields.insert("UserName".to_string(), Value::Unprotected("kay@example.org".to_string()));
    mail.fields.insert("Password".to_string(), Value::Protected("hunter2".as_bytes().into()));
    mail.fields.insert("URL".to_string(), Value::Unprotected("https://mail.example.org".to_string()));
    mail.fields.insert(
        "otp".to_string(),
        Value::Protected(
            "otpauth://totp/mail?secret=JBSWY3DPEHPK3PXP&digits=6&algorithm=SHA1&period=30"
                .as_bytes()
                .into(),
        ),
    );
    logins.children.push(Node::Entry(mail));

    let mut forum = keepass::db::Entry::new();
    forum.fields.insert("Title".to_string(), Value::Unprotected("Forum".to_string()));
    forum.fields.insert("UserName".to_string(), Value::Unprotected("kay".to_string()));
    forum.fields.insert("Password".to_string(), Value::Protected("correct horse".as_bytes().into()));
    forum.fields.insert("Notes".to_string(), Value::Unprotected("Recovery codes attached".to_string()));
    // Attachment content lives in the inner header, referenced by index
    db.header_attachments.push(HeaderAttachment {
        flags: 0,
        content: b"11111-22222\n33333-44444\n".to_vec(),
    });
    forum.fields.insert(
        format!("{ATTACHMENT_FIELD_PREFIX}recovery-codes.txt"),
        Value::Unprotected("0".to_string()),
    );
    logins.children.push(Node::Entry(forum));

    db.root.children.push(Node::Group(logins));

    // Template records: each custom field declares one attribute,
    // the value names its kind
    let mut templates = keepass::db::Group::new("Templates");

    let mut card = keepass::db::Entry::new();
    card.fields.insert("Title".to_string(), Value::Unprotected("Credit Card".to_string()));
    card.fields.insert("Number".to_string(), Value::Protected("text".as_bytes().into()));
    card.fields.insert("CVV".to_string(), Value::Protected("text".as_bytes().into()));
    card.fields.insert("Valid until".to_string(), Value::Unprotected("datetime".to_string()));
    templates.children.push(Node::Entry(card));

    let mut wifi = keepass::db::Entry::new();
    wifi.fields.insert("Title".to_string(), Value::Unprotected("Wi-Fi".to_string()));
    wifi.fields.insert("SSID".to_string(), Value::Unprotected("text".to_string()));
    wifi.fields.insert("Pre-shared key".to_string(), Value::Protected("text".as_bytes().into()));
    templates.children.push(Node::Entry(wifi));

    db.root.children.push(Node::Group(templates));

    // Recycle bin
    let mut bin = keepass::db::Group::new("Recycle Bin");
    bin.icon_id = Some(43); // Trash icon
    let bin_uuid = bin.uuid;
    db.root.children.push(Node::Group(bin));
    db.meta.recyclebin_uuid = Some(bin_uuid);
    db.meta.recyclebin_enabled = Some(true);

    let key = DatabaseKey::new().with_password("demo password");
    let mut file = File::create("demo_vault.kdbx")?;
    db.save(&mut file, key)?;

    println!("Created demo_vault.kdbx with password 'demo password'");
    Ok(())
}
