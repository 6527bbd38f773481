//! sesame demo - a scripted entry editing session against a KDBX vault.
//!
//! Opens (or creates) a vault, spawns an editing session and walks the
//! main flows: loading with registration data, template selection,
//! custom fields, password generation, OTP setup, attachment tracking
//! and the final save.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sesame_core::kdbx::TEMPLATES_GROUP;
use sesame_core::models::{PASSWORD_FIELD, TITLE_FIELD};
use sesame_core::{
    Attachment, Entry, EntryInfo, Field, KdbxVault, OtpElement, RegisterInfo, SearchInfo,
    SharedKdbxVault, VaultStore,
};
use sesame_edit::{
    generate_password, password_strength, AttachmentProgress, EditConfig, EntryAttachmentState,
    EntryEditSession, StateReceiver, TemplatesEntry,
};
use tracing_subscriber::EnvFilter;

/// sesame demo - scripted tour of the entry editing coordinator
#[derive(Parser, Debug)]
#[command(name = "sesame-demo")]
#[command(about = "Drives one scripted entry editing session against a KDBX vault")]
struct Args {
    /// Path to the KDBX vault file (created when missing)
    #[arg(short, long, default_value = "demo_vault.kdbx")]
    vault: PathBuf,

    /// Master password of the vault
    #[arg(short, long, default_value = "demo password")]
    password: String,

    /// Path to a configuration file overriding the default one
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sesame=info".parse()?))
        .init();

    let args = Args::parse();

    let config = match args.config {
        Some(path) => EditConfig::load(Some(path))?,
        None => EditConfig::default(),
    };

    let vault = if args.vault.exists() {
        tracing::info!("Unlocking vault {}", args.vault.display());
        SharedKdbxVault::new(KdbxVault::unlock(&args.vault, &args.password)?)
    } else {
        tracing::info!("Creating vault {}", args.vault.display());
        let created = KdbxVault::create(&args.vault, &args.password, "sesame demo")?;
        let vault = SharedKdbxVault::new(created);
        seed_templates(&vault)?;
        vault
    };

    {
        let guard = vault.read();
        tracing::info!(
            "Vault '{}' ready at {}",
            guard.database_name().unwrap_or("unnamed"),
            guard.path().display()
        );
    }

    let parent = vault.write().ensure_group("Logins");

    let store: Arc<dyn VaultStore> = Arc::new(vault.clone());
    let session = EntryEditSession::spawn_with_config(store, config.clone());

    // Subscribe before driving the session; announcements without an
    // observer are dropped.
    let mut templates_entry = session.templates_entry();
    let mut template_changes = session.template_changes();
    let mut field_editions = session.field_editions();
    let mut password_requests = session.password_selection_requests();
    let mut selected_passwords = session.selected_passwords();
    let mut otp_requests = session.otp_setup_requests();
    let mut created_otps = session.created_otps();
    let attachment_states = session.attachment_states();
    let mut saved_entries = session.saved_entries();

    // A browser extension noticed a registration on example.com.
    let register = RegisterInfo {
        search_info: SearchInfo {
            web_domain: Some("example.com".to_string()),
            web_scheme: None,
            application_id: None,
        },
        username: Some("ada".to_string()),
        password: None,
    };
    session.load_template_entry(None, false, Some(register), None);

    let loaded = wait_for_load(&mut templates_entry).await?;
    tracing::info!(
        "Loaded {} templates, editing under '{}'",
        loaded.templates.len(),
        loaded.template.name
    );
    let mut info = loaded.entry_info.unwrap_or_else(EntryInfo::new);
    tracing::info!(
        "Prefilled title '{}' and username '{}'",
        info.title,
        info.username
    );

    // Pick the card template; picking it a second time stays quiet.
    if let Some(card) = loaded.templates.iter().find(|t| t.name == "Credit Card") {
        session.change_template(card.clone());
        session.change_template(card.clone());
        if let Some(template) = template_changes.recv().await {
            tracing::info!("Template changed to '{}'", template.name);
        }
    }

    // Add a protected custom field through the edition round trip.
    session.add_custom_field(Field::protected("PIN", "8732"));
    if let Some(edition) = field_editions.recv().await {
        if let Some(field) = edition.new_field {
            info.add_unique_field(field);
        }
    }

    // Password generation: request, generate, hand the result back.
    session.request_password_selection(Field::protected(PASSWORD_FIELD, ""));
    if let Some(field) = password_requests.recv().await {
        let password = generate_password(&config.generator);
        let (_, label) = password_strength(&password);
        tracing::info!("Generated a '{}' password for {}", label, field.name);
        session.select_password(Field::protected(field.name, password));
    }
    if let Some(field) = selected_passwords.recv().await {
        info.password = field.value;
    }

    // OTP setup round trip.
    session.setup_otp();
    if otp_requests.recv().await.is_some() {
        session.create_otp(OtpElement::totp("JBSWY3DPEHPK3PXP"));
    }
    if let Some(element) = created_otps.recv().await {
        tracing::info!("Configured OTP {}", element.otpauth_uri());
        info.otp = Some(element);
    }

    // Track one attachment upload to completion.
    let binary = vault.write().add_binary(b"recovery codes".to_vec());
    let attachment = Attachment::new("recovery-codes.txt", binary);
    let state = EntryAttachmentState::upload(attachment.clone());
    session.report_attachment_action(Some(state.clone()));
    session.report_attachment_action(Some(state.with_progress(AttachmentProgress::Completed)));
    session.flush().await;
    if let Some(state) = attachment_states.current() {
        tracing::info!(
            "Attachment '{}' is {:?}",
            state.attachment.file_name,
            state.progress
        );
    }
    info.attachments.push(attachment);

    // Assemble the save payload and persist it.
    session.save_entry_info(None, Some(parent), info);
    let Some(save) = saved_entries.recv().await else {
        anyhow::bail!("Session closed before the save finished");
    };

    {
        let mut guard = vault.write();
        guard.apply_save(save.old_entry.as_ref(), &save.new_entry, save.parent.as_ref())?;
        guard.save()?;
    }
    tracing::info!(
        "Saved entry {} to {}",
        save.new_entry.uuid,
        args.vault.display()
    );

    Ok(())
}

/// Wait for the next finished load, skipping the initial empty state.
async fn wait_for_load(
    rx: &mut StateReceiver<Option<TemplatesEntry>>,
) -> Result<TemplatesEntry> {
    loop {
        match rx.updated().await {
            Some(Some(loaded)) => return Ok(loaded),
            Some(None) => continue,
            None => anyhow::bail!("Session closed before the load finished"),
        }
    }
}

/// Store a card template record so the demo has something to pick.
fn seed_templates(vault: &SharedKdbxVault) -> Result<()> {
    let mut guard = vault.write();
    let templates = guard.ensure_group(TEMPLATES_GROUP);

    let mut card = Entry::new();
    card.set_field(TITLE_FIELD, "Credit Card", false);
    card.set_field("Number", "text", true);
    card.set_field("CVV", "text", true);
    card.set_field("Valid until", "datetime", false);
    guard.upsert_entry(&card, Some(&templates))?;

    tracing::info!("Seeded the Credit Card template");
    Ok(())
}
