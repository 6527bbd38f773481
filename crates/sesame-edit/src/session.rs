//! The entry editing session actor.
//!
//! One task owns all session state: the explicit template choice and the
//! attachment tracker. Handle methods enqueue inputs on the session
//! mailbox; template resolution and save assembly run on blocking workers
//! whose results come back through the same mailbox, so state never
//! changes and nothing is published from outside the owner task.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sesame_core::{
    Attachment, Entry, EntryInfo, Field, Group, IconImage, OtpElement, RegisterInfo, SearchInfo,
    Template, VaultStore,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task;

use crate::attachments::{strip_unfinished_uploads, AttachmentTracker, EntryAttachmentState};
use crate::channel::{EventChannel, EventReceiver, StateChannel, StateReceiver};
use crate::config::EditConfig;
use crate::events::{
    AttachmentBuild, AttachmentPosition, AttachmentUpload, EntrySave, EntryUpdate, FieldEdition,
    TemplatesEntry,
};

/// Everything the session can be told, worker results included.
enum SessionInput {
    /// Load the template collection and the entry's editable projection.
    LoadTemplateEntry {
        entry: Option<Entry>,
        template_mode: bool,
        register_info: Option<RegisterInfo>,
        search_info: Option<SearchInfo>,
    },
    /// A load worker finished.
    LoadFinished(TemplatesEntry),
    /// The user picked a template.
    ChangeTemplate(Template),
    /// Ask the surface for its current projection.
    RequestEntryInfoUpdate {
        entry: Option<Entry>,
        parent: Option<Group>,
    },
    /// Assemble the save payload for an edited projection.
    SaveEntryInfo {
        entry: Option<Entry>,
        parent: Option<Group>,
        entry_info: EntryInfo,
    },
    /// A save worker finished; `None` means the save was dropped.
    SaveFinished(Option<EntrySave>),
    RequestPasswordSelection(Field),
    SelectPassword(Field),
    RequestCustomFieldEdition(Field),
    AddCustomField(Field),
    EditCustomField { old_field: Field, new_field: Field },
    RemoveCustomField(Field),
    CustomFieldError,
    SetupOtp,
    CreateOtp(OtpElement),
    RequestIconSelection(IconImage),
    SelectIcon(IconImage),
    RequestDateTimeSelection(DateTime<Utc>),
    SelectDate(NaiveDate),
    SelectTime(NaiveTime),
    BuildAttachment { source: PathBuf, file_name: String },
    UploadAttachment { source: PathBuf, attachment: Attachment },
    DeleteAttachment(Attachment),
    /// The surface reported an attachment transfer state.
    AttachmentAction(Option<EntryAttachmentState>),
    BinaryPreviewLoaded {
        state: EntryAttachmentState,
        position: f32,
    },
    /// Acknowledge once every input sent before this one is processed.
    Flush(oneshot::Sender<()>),
}

/// The channels a session publishes on.
#[derive(Default)]
struct SessionChannels {
    templates_entry: StateChannel<Option<TemplatesEntry>>,
    attachment_state: StateChannel<Option<EntryAttachmentState>>,
    template_changed: EventChannel<Template>,
    entry_update: EventChannel<EntryUpdate>,
    entry_saved: EventChannel<EntrySave>,
    password_selection: EventChannel<Field>,
    password_selected: EventChannel<Field>,
    field_edition: EventChannel<Field>,
    field_edited: EventChannel<FieldEdition>,
    field_error: EventChannel<()>,
    otp_setup: EventChannel<()>,
    otp_created: EventChannel<OtpElement>,
    icon_selection: EventChannel<IconImage>,
    icon_selected: EventChannel<IconImage>,
    date_time_selection: EventChannel<DateTime<Utc>>,
    date_selected: EventChannel<NaiveDate>,
    time_selected: EventChannel<NaiveTime>,
    attachment_build: EventChannel<AttachmentBuild>,
    attachment_upload: EventChannel<AttachmentUpload>,
    attachment_deleted: EventChannel<Attachment>,
    binary_preview: EventChannel<AttachmentPosition>,
}

/// Owner task of one editing session.
pub struct EntryEditSession {
    store: Arc<dyn VaultStore>,
    config: EditConfig,
    /// Template explicitly chosen this session, if any.
    template_choice: Option<Template>,
    tracker: AttachmentTracker,
    channels: Arc<SessionChannels>,
    /// For workers to post results back; weak so the mailbox closes once
    /// all handles are gone.
    input_tx: mpsc::WeakUnboundedSender<SessionInput>,
}

impl EntryEditSession {
    /// Spawn a session over a store with default configuration.
    pub fn spawn(store: Arc<dyn VaultStore>) -> EntryEditHandle {
        Self::spawn_with_config(store, EditConfig::default())
    }

    /// Spawn a session; the returned handle is the only way to reach it.
    ///
    /// The session ends when the last handle clone is dropped.
    pub fn spawn_with_config(store: Arc<dyn VaultStore>, config: EditConfig) -> EntryEditHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let channels = Arc::new(SessionChannels::default());
        let session = Self {
            store,
            config,
            template_choice: None,
            tracker: AttachmentTracker::new(),
            channels: Arc::clone(&channels),
            input_tx: tx.downgrade(),
        };
        task::spawn(session.run(rx));
        EntryEditHandle { tx, channels }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionInput>) {
        while let Some(input) = rx.recv().await {
            self.handle(input);
        }
        tracing::debug!("Entry edit session closed");
    }

    fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::LoadTemplateEntry {
                entry,
                template_mode,
                register_info,
                search_info,
            } => self.spawn_load(entry, template_mode, register_info, search_info),
            SessionInput::LoadFinished(result) => {
                tracing::debug!(
                    "Loaded {} templates, resolved {}",
                    result.templates.len(),
                    result.template.name
                );
                self.channels.templates_entry.publish(Some(result));
            }
            SessionInput::ChangeTemplate(template) => self.change_template(template),
            SessionInput::RequestEntryInfoUpdate { entry, parent } => {
                self.channels.entry_update.emit(EntryUpdate { entry, parent });
            }
            SessionInput::SaveEntryInfo {
                entry,
                parent,
                entry_info,
            } => self.spawn_save(entry, parent, entry_info),
            SessionInput::SaveFinished(Some(save)) => {
                tracing::info!("Entry {} ready to persist", save.new_entry.uuid);
                self.channels.entry_saved.emit(save);
            }
            SessionInput::SaveFinished(None) => {}
            SessionInput::RequestPasswordSelection(field) => {
                self.channels.password_selection.emit(field);
            }
            SessionInput::SelectPassword(field) => self.channels.password_selected.emit(field),
            SessionInput::RequestCustomFieldEdition(field) => {
                self.channels.field_edition.emit(field);
            }
            SessionInput::AddCustomField(field) => self.channels.field_edited.emit(FieldEdition {
                old_field: None,
                new_field: Some(field),
            }),
            SessionInput::EditCustomField {
                old_field,
                new_field,
            } => self.channels.field_edited.emit(FieldEdition {
                old_field: Some(old_field),
                new_field: Some(new_field),
            }),
            SessionInput::RemoveCustomField(field) => {
                self.channels.field_edited.emit(FieldEdition {
                    old_field: Some(field),
                    new_field: None,
                });
            }
            SessionInput::CustomFieldError => self.channels.field_error.emit(()),
            SessionInput::SetupOtp => self.channels.otp_setup.emit(()),
            SessionInput::CreateOtp(element) => self.channels.otp_created.emit(element),
            SessionInput::RequestIconSelection(icon) => self.channels.icon_selection.emit(icon),
            SessionInput::SelectIcon(icon) => self.channels.icon_selected.emit(icon),
            SessionInput::RequestDateTimeSelection(at) => {
                self.channels.date_time_selection.emit(at);
            }
            SessionInput::SelectDate(date) => self.channels.date_selected.emit(date),
            SessionInput::SelectTime(time) => self.channels.time_selected.emit(time),
            SessionInput::BuildAttachment { source, file_name } => {
                self.channels
                    .attachment_build
                    .emit(AttachmentBuild { source, file_name });
            }
            SessionInput::UploadAttachment { source, attachment } => {
                self.channels
                    .attachment_upload
                    .emit(AttachmentUpload { source, attachment });
            }
            SessionInput::DeleteAttachment(attachment) => {
                self.channels.attachment_deleted.emit(attachment);
            }
            SessionInput::AttachmentAction(state) => {
                self.tracker.upsert(state.as_ref());
                // Always re-published, even for a state equal to the last.
                self.channels.attachment_state.publish(state);
            }
            SessionInput::BinaryPreviewLoaded { state, position } => {
                let position = if position.is_finite() {
                    position.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                self.channels.binary_preview.emit(AttachmentPosition { state, position });
            }
            SessionInput::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn change_template(&mut self, template: Template) {
        if self.template_choice.as_ref() == Some(&template) {
            return;
        }
        tracing::debug!("Template changed to {}", template.name);
        self.template_choice = Some(template.clone());
        self.channels.template_changed.emit(template);
    }

    fn spawn_load(
        &self,
        entry: Option<Entry>,
        template_mode: bool,
        register_info: Option<RegisterInfo>,
        search_info: Option<SearchInfo>,
    ) {
        let store = Arc::clone(&self.store);
        let choice = self.template_choice.clone();
        let include_sensitive = self.config.include_sensitive;
        let input_tx = self.input_tx.clone();
        task::spawn_blocking(move || {
            let result = load_templates_entry(
                store.as_ref(),
                choice,
                entry,
                template_mode,
                register_info,
                search_info,
                include_sensitive,
            );
            if let Some(tx) = input_tx.upgrade() {
                let _ = tx.send(SessionInput::LoadFinished(result));
            }
        });
    }

    fn spawn_save(&self, entry: Option<Entry>, parent: Option<Group>, entry_info: EntryInfo) {
        let store = Arc::clone(&self.store);
        let template_change = self.template_choice.clone();
        let tracked = self.tracker.snapshot();
        let input_tx = self.input_tx.clone();
        task::spawn_blocking(move || {
            let result = build_entry_save(
                store.as_ref(),
                &tracked,
                template_change,
                entry,
                parent,
                entry_info,
            );
            if let Some(tx) = input_tx.upgrade() {
                let _ = tx.send(SessionInput::SaveFinished(result));
            }
        });
    }
}

/// Pick the session's explicit template choice, else the entry's own,
/// else the standard template.
pub fn resolve_template(explicit: Option<Template>, entry_template: Option<Template>) -> Template {
    explicit.or(entry_template).unwrap_or_else(Template::standard)
}

fn load_templates_entry(
    store: &dyn VaultStore,
    choice: Option<Template>,
    entry: Option<Entry>,
    template_mode: bool,
    register_info: Option<RegisterInfo>,
    search_info: Option<SearchInfo>,
    include_sensitive: bool,
) -> TemplatesEntry {
    let templates = store.templates(template_mode).unwrap_or_else(|err| {
        tracing::warn!("Template listing failed: {err}");
        Vec::new()
    });

    let entry_template = entry.as_ref().and_then(|e| store.template_of(e));
    let template = resolve_template(choice, entry_template);

    let entry_info = entry.and_then(|e| match store.decode_entry(&e) {
        Ok(decoded) => {
            let mut info = decoded.to_info(include_sensitive);
            match (&register_info, &search_info) {
                (Some(register), _) => info.merge_register_info(register),
                (None, Some(search)) => info.merge_search_info(search),
                (None, None) => {}
            }
            Some(info)
        }
        Err(err) => {
            tracing::warn!("Entry decode failed: {err}");
            None
        }
    });

    TemplatesEntry {
        templates,
        template,
        entry_info,
    }
}

fn build_entry_save(
    store: &dyn VaultStore,
    tracked: &[EntryAttachmentState],
    template_change: Option<Template>,
    original: Option<Entry>,
    parent: Option<Group>,
    mut entry_info: EntryInfo,
) -> Option<EntrySave> {
    // Attachments whose upload never finished must not be persisted.
    strip_unfinished_uploads(&mut entry_info, tracked);

    let mut new_entry = match &original {
        Some(old) => {
            let mut updated = old.clone();
            updated.apply_info(&entry_info);
            updated
        }
        None => Entry::from_info(&entry_info),
    };

    if let Some(template) = template_change {
        match store.encode_entry(&new_entry, &template) {
            Ok(encoded) => new_entry = encoded,
            Err(err) => {
                tracing::warn!("Entry encode failed, save dropped: {err}");
                return None;
            }
        }
    }

    // Tracked attachments the entry no longer carries are orphans; ask the
    // pool to forget their binaries unless another entry still uses them.
    let pool = store.attachment_pool();
    for state in tracked {
        if new_entry.attachments.contains(&state.attachment) {
            continue;
        }
        if pool.remove_if_unreferenced(&state.attachment) {
            tracing::debug!("Removed orphaned attachment {}", state.attachment.file_name);
        }
    }

    Some(EntrySave {
        old_entry: original,
        new_entry,
        parent,
    })
}

/// Cloneable handle driving a session and subscribing to its channels.
#[derive(Clone)]
pub struct EntryEditHandle {
    tx: mpsc::UnboundedSender<SessionInput>,
    channels: Arc<SessionChannels>,
}

impl EntryEditHandle {
    fn send(&self, input: SessionInput) {
        if self.tx.send(input).is_err() {
            tracing::debug!("Entry edit session gone, input dropped");
        }
    }

    /// Load the template collection and the entry's editable projection.
    ///
    /// The result lands on [`templates_entry`](Self::templates_entry).
    /// Registration data takes precedence over a plain search association.
    pub fn load_template_entry(
        &self,
        entry: Option<Entry>,
        template_mode: bool,
        register_info: Option<RegisterInfo>,
        search_info: Option<SearchInfo>,
    ) {
        self.send(SessionInput::LoadTemplateEntry {
            entry,
            template_mode,
            register_info,
            search_info,
        });
    }

    /// Record an explicit template choice; repeats are not re-announced.
    pub fn change_template(&self, template: Template) {
        self.send(SessionInput::ChangeTemplate(template));
    }

    /// Ask the surface for its current projection of the entry.
    pub fn request_entry_info_update(&self, entry: Option<Entry>, parent: Option<Group>) {
        self.send(SessionInput::RequestEntryInfoUpdate { entry, parent });
    }

    /// Assemble the save payload for an edited projection.
    ///
    /// On success the payload lands on [`saved_entries`](Self::saved_entries);
    /// a failed assembly is silent.
    pub fn save_entry_info(
        &self,
        entry: Option<Entry>,
        parent: Option<Group>,
        entry_info: EntryInfo,
    ) {
        self.send(SessionInput::SaveEntryInfo {
            entry,
            parent,
            entry_info,
        });
    }

    /// Ask the surface to open password generation for a field.
    pub fn request_password_selection(&self, field: Field) {
        self.send(SessionInput::RequestPasswordSelection(field));
    }

    /// Answer a password selection request.
    pub fn select_password(&self, field: Field) {
        self.send(SessionInput::SelectPassword(field));
    }

    /// Ask the surface to open custom field edition.
    pub fn request_custom_field_edition(&self, field: Field) {
        self.send(SessionInput::RequestCustomFieldEdition(field));
    }

    pub fn add_custom_field(&self, field: Field) {
        self.send(SessionInput::AddCustomField(field));
    }

    pub fn edit_custom_field(&self, old_field: Field, new_field: Field) {
        self.send(SessionInput::EditCustomField {
            old_field,
            new_field,
        });
    }

    pub fn remove_custom_field(&self, field: Field) {
        self.send(SessionInput::RemoveCustomField(field));
    }

    /// Signal that a custom field submission was rejected.
    pub fn report_custom_field_error(&self) {
        self.send(SessionInput::CustomFieldError);
    }

    /// Ask the surface to open OTP setup.
    pub fn setup_otp(&self) {
        self.send(SessionInput::SetupOtp);
    }

    /// Answer OTP setup with the configured element.
    pub fn create_otp(&self, element: OtpElement) {
        self.send(SessionInput::CreateOtp(element));
    }

    pub fn request_icon_selection(&self, icon: IconImage) {
        self.send(SessionInput::RequestIconSelection(icon));
    }

    pub fn select_icon(&self, icon: IconImage) {
        self.send(SessionInput::SelectIcon(icon));
    }

    pub fn request_date_time_selection(&self, at: DateTime<Utc>) {
        self.send(SessionInput::RequestDateTimeSelection(at));
    }

    pub fn select_date(&self, date: NaiveDate) {
        self.send(SessionInput::SelectDate(date));
    }

    pub fn select_time(&self, time: NaiveTime) {
        self.send(SessionInput::SelectTime(time));
    }

    /// Ask for an attachment to be built from a file on disk.
    pub fn build_attachment(&self, source: PathBuf, file_name: impl Into<String>) {
        self.send(SessionInput::BuildAttachment {
            source,
            file_name: file_name.into(),
        });
    }

    /// Ask for a built attachment to be streamed into the vault.
    pub fn upload_attachment(&self, source: PathBuf, attachment: Attachment) {
        self.send(SessionInput::UploadAttachment { source, attachment });
    }

    pub fn delete_attachment(&self, attachment: Attachment) {
        self.send(SessionInput::DeleteAttachment(attachment));
    }

    /// Report an attachment transfer state observed by a collaborator.
    pub fn report_attachment_action(&self, state: Option<EntryAttachmentState>) {
        self.send(SessionInput::AttachmentAction(state));
    }

    /// Report a loaded binary preview; the position is clamped to [0, 1]
    /// and a non-finite position collapses to 0.
    pub fn report_binary_preview(&self, state: EntryAttachmentState, position: f32) {
        self.send(SessionInput::BinaryPreviewLoaded { state, position });
    }

    /// Wait until every input sent so far has been processed.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SessionInput::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Latest loaded template/entry state; late subscribers catch up.
    pub fn templates_entry(&self) -> StateReceiver<Option<TemplatesEntry>> {
        self.channels.templates_entry.subscribe()
    }

    /// Latest reported attachment transfer state.
    pub fn attachment_states(&self) -> StateReceiver<Option<EntryAttachmentState>> {
        self.channels.attachment_state.subscribe()
    }

    /// Announcements of effective template changes.
    pub fn template_changes(&self) -> EventReceiver<Template> {
        self.channels.template_changed.subscribe()
    }

    /// Requests for the surface's current projection.
    pub fn entry_update_requests(&self) -> EventReceiver<EntryUpdate> {
        self.channels.entry_update.subscribe()
    }

    /// Finished save payloads.
    pub fn saved_entries(&self) -> EventReceiver<EntrySave> {
        self.channels.entry_saved.subscribe()
    }

    pub fn password_selection_requests(&self) -> EventReceiver<Field> {
        self.channels.password_selection.subscribe()
    }

    pub fn selected_passwords(&self) -> EventReceiver<Field> {
        self.channels.password_selected.subscribe()
    }

    pub fn field_edition_requests(&self) -> EventReceiver<Field> {
        self.channels.field_edition.subscribe()
    }

    /// Custom field edits; an absent side marks an addition or removal.
    pub fn field_editions(&self) -> EventReceiver<FieldEdition> {
        self.channels.field_edited.subscribe()
    }

    pub fn field_errors(&self) -> EventReceiver<()> {
        self.channels.field_error.subscribe()
    }

    pub fn otp_setup_requests(&self) -> EventReceiver<()> {
        self.channels.otp_setup.subscribe()
    }

    pub fn created_otps(&self) -> EventReceiver<OtpElement> {
        self.channels.otp_created.subscribe()
    }

    pub fn icon_selection_requests(&self) -> EventReceiver<IconImage> {
        self.channels.icon_selection.subscribe()
    }

    pub fn selected_icons(&self) -> EventReceiver<IconImage> {
        self.channels.icon_selected.subscribe()
    }

    pub fn date_time_selection_requests(&self) -> EventReceiver<DateTime<Utc>> {
        self.channels.date_time_selection.subscribe()
    }

    pub fn selected_dates(&self) -> EventReceiver<NaiveDate> {
        self.channels.date_selected.subscribe()
    }

    pub fn selected_times(&self) -> EventReceiver<NaiveTime> {
        self.channels.time_selected.subscribe()
    }

    pub fn attachment_build_requests(&self) -> EventReceiver<AttachmentBuild> {
        self.channels.attachment_build.subscribe()
    }

    pub fn attachment_upload_requests(&self) -> EventReceiver<AttachmentUpload> {
        self.channels.attachment_upload.subscribe()
    }

    pub fn attachment_deletions(&self) -> EventReceiver<Attachment> {
        self.channels.attachment_deleted.subscribe()
    }

    /// Loaded binary previews with their clamped scroll position.
    pub fn binary_previews(&self) -> EventReceiver<AttachmentPosition> {
        self.channels.binary_preview.subscribe()
    }
}
