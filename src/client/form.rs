//! Upload form controller: composes one item record, uploads its new
//! images and persists it.
//!
//! Submission order is fixed: validate, upload the cover, upload each new
//! detail image in turn, assemble tags, then create or update the record.
//! The first failure aborts the sequence. Images uploaded before a failure
//! are kept and their slots remember the resolved URL, so a retry does not
//! upload them again.

use super::{
    ClientError, ClientResult, ItemStore, LocalFile, ProgressFn, SAVE_FAILED,
    uploader::{UploadOptions, Uploader},
};
use crate::{
    catalog::{self, COVER_FOLDER, DETAIL_FOLDER, WEIGHT_UNIT},
    models::{
        item::{ImageAsset, Item, ItemPayload},
        tag::{SizeValue, Tag},
    },
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::{
    io::Cursor,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

/// Where a slot's image currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Selected locally, not uploaded yet.
    Pending(LocalFile),
    /// Already in object storage.
    Uploaded { url: String },
}

/// One cover or detail image slot of the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub source: ImageSource,
    /// Data URL for pending files, the remote URL otherwise.
    pub preview: String,
    pub width: u32,
    pub height: u32,
    pub uploading: bool,
    pub progress: u8,
}

impl LocalImage {
    /// Decode `file` far enough to learn its pixel size and build a preview.
    ///
    /// Decoding runs on the blocking pool.
    pub async fn load(file: LocalFile) -> ClientResult<Self> {
        let bytes = file.bytes.clone();
        let (width, height) = tokio::task::spawn_blocking(move || read_dimensions(&bytes))
            .await
            .map_err(|e| ClientError::Image(e.to_string()))??;
        let preview = format!("data:{};base64,{}", file.mime_type, STANDARD.encode(&file.bytes));

        Ok(Self {
            source: ImageSource::Pending(file),
            preview,
            width,
            height,
            uploading: false,
            progress: 0,
        })
    }

    pub fn from_asset(asset: &ImageAsset) -> Self {
        Self {
            source: ImageSource::Uploaded {
                url: asset.url.clone(),
            },
            preview: asset.url.clone(),
            width: asset.width,
            height: asset.height,
            uploading: false,
            progress: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self.source, ImageSource::Pending(_))
    }

    /// The resolved asset, once the image is in storage.
    pub fn asset(&self) -> Option<ImageAsset> {
        match &self.source {
            ImageSource::Uploaded { url } => Some(ImageAsset::new(url, self.width, self.height)),
            ImageSource::Pending(_) => None,
        }
    }
}

/// Read pixel dimensions from an encoded image.
pub fn read_dimensions(bytes: &[u8]) -> ClientResult<(u32, u32)> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ClientError::Image(e.to_string()))?
        .into_dimensions()
        .map_err(|e| ClientError::Image(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(ClientError::Image("image has no pixels".into()));
    }
    Ok((width, height))
}

/// Scalar fields of the form, as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    pub title: String,
    pub variety: String,
    pub owner_name: String,
    pub description: String,
    pub length: String,
    pub width: String,
    pub height: String,
    /// Grams, without unit.
    pub weight: String,
    pub play_time_value: String,
    pub play_time_unit: String,
    pub color: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            title: String::new(),
            variety: catalog::default_variety().to_string(),
            owner_name: String::new(),
            description: String::new(),
            length: String::new(),
            width: String::new(),
            height: String::new(),
            weight: String::new(),
            play_time_value: String::new(),
            play_time_unit: catalog::PLAY_TIME_UNITS[0].to_string(),
            color: String::new(),
        }
    }
}

impl FormFields {
    /// Seed fields from a stored item, reading its tags back by kind.
    pub fn from_item(item: &Item) -> Self {
        let mut fields = Self {
            title: item.title.clone(),
            variety: item.variety.clone(),
            owner_name: item.owner_name.clone(),
            description: item.description.clone(),
            ..Self::default()
        };

        for tag in &item.tags {
            match tag {
                Tag::Size(size) => {
                    fields.length = size.length.clone().unwrap_or_default();
                    fields.width = size.width.clone().unwrap_or_default();
                    fields.height = size.height.clone().unwrap_or_default();
                }
                Tag::Weight(v) => {
                    fields.weight = v.trim().trim_end_matches(WEIGHT_UNIT).trim().to_string();
                }
                Tag::PlayTime(v) => {
                    let (value, unit) = split_play_time(v);
                    fields.play_time_value = value.to_string();
                    if !unit.is_empty() {
                        fields.play_time_unit = unit.to_string();
                    }
                }
                Tag::Color(v) => fields.color = v.clone(),
            }
        }
        fields
    }
}

/// Split `"3年"` into `("3", "年")`.
fn split_play_time(raw: &str) -> (&str, &str) {
    let raw = raw.trim();
    let idx = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    (raw[..idx].trim(), raw[idx..].trim())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Build the tag list from form fields. Empty fields produce no tag; the
/// size tag appears when any of its three dimensions is filled in.
pub fn build_tags(fields: &FormFields) -> Vec<Tag> {
    let mut tags = Vec::new();

    let size = SizeValue {
        length: non_empty(&fields.length),
        width: non_empty(&fields.width),
        height: non_empty(&fields.height),
    };
    if !size.is_empty() {
        tags.push(Tag::Size(size));
    }

    if let Some(weight) = non_empty(&fields.weight) {
        let grams = weight.trim_end_matches(WEIGHT_UNIT).trim();
        tags.push(Tag::Weight(format!("{}{}", grams, WEIGHT_UNIT)));
    }

    if let Some(value) = non_empty(&fields.play_time_value) {
        tags.push(Tag::PlayTime(format!(
            "{}{}",
            value,
            fields.play_time_unit.trim()
        )));
    }

    if let Some(color) = non_empty(&fields.color) {
        tags.push(Tag::Color(color));
    }

    tags
}

#[derive(Debug, Clone, Default)]
struct FormState {
    fields: FormFields,
    cover: Option<LocalImage>,
    details: Vec<LocalImage>,
}

/// Read-only view of the form for rendering.
#[derive(Debug, Clone)]
pub struct FormSnapshot {
    pub fields: FormFields,
    pub cover: Option<LocalImage>,
    pub details: Vec<LocalImage>,
    pub submitting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Cover,
    Detail(usize),
}

/// Clears the submitting flag however the submission ends.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct UploadForm {
    uploader: Arc<Uploader>,
    store: Arc<dyn ItemStore>,
    editing: Option<String>,
    state: Mutex<FormState>,
    submitting: AtomicBool,
}

impl UploadForm {
    /// An empty form that creates a new item.
    pub fn new(uploader: Arc<Uploader>, store: Arc<dyn ItemStore>) -> Self {
        Self {
            uploader,
            store,
            editing: None,
            state: Mutex::new(FormState::default()),
            submitting: AtomicBool::new(false),
        }
    }

    /// A form seeded from `item` that updates it in place.
    pub fn for_edit(uploader: Arc<Uploader>, store: Arc<dyn ItemStore>, item: &Item) -> Self {
        let state = FormState {
            fields: FormFields::from_item(item),
            cover: Some(LocalImage::from_asset(&item.cover_image)),
            details: item
                .detail_images
                .iter()
                .flatten()
                .map(LocalImage::from_asset)
                .collect(),
        };
        Self {
            uploader,
            store,
            editing: Some(item.id.clone()),
            state: Mutex::new(state),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_idle(&self) -> ClientResult<()> {
        if self.is_submitting() {
            return Err(ClientError::Busy);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let state = self.state();
        FormSnapshot {
            fields: state.fields.clone(),
            cover: state.cover.clone(),
            details: state.details.clone(),
            submitting: self.is_submitting(),
        }
    }

    pub fn update_fields(&self, edit: impl FnOnce(&mut FormFields)) -> ClientResult<()> {
        self.ensure_idle()?;
        edit(&mut self.state().fields);
        Ok(())
    }

    /// Decode and admit a new cover image, replacing any previous one.
    pub async fn select_cover(&self, file: LocalFile) -> ClientResult<()> {
        self.ensure_idle()?;
        let image = LocalImage::load(file).await?;
        self.ensure_idle()?;
        self.state().cover = Some(image);
        Ok(())
    }

    pub fn clear_cover(&self) -> ClientResult<()> {
        self.ensure_idle()?;
        self.state().cover = None;
        Ok(())
    }

    /// Decode and append detail images. Nothing is admitted if any file
    /// fails to decode.
    pub async fn add_details(&self, files: Vec<LocalFile>) -> ClientResult<()> {
        self.ensure_idle()?;
        let mut loaded = Vec::with_capacity(files.len());
        for file in files {
            loaded.push(LocalImage::load(file).await?);
        }
        self.ensure_idle()?;
        self.state().details.extend(loaded);
        Ok(())
    }

    pub fn remove_detail(&self, index: usize) -> ClientResult<Option<LocalImage>> {
        self.ensure_idle()?;
        let mut state = self.state();
        Ok((index < state.details.len()).then(|| state.details.remove(index)))
    }

    fn slot_mut<'a>(state: &'a mut FormState, slot: Slot) -> Option<&'a mut LocalImage> {
        match slot {
            Slot::Cover => state.cover.as_mut(),
            Slot::Detail(i) => state.details.get_mut(i),
        }
    }

    fn set_progress(&self, slot: Slot, percent: u8) {
        if let Some(image) = Self::slot_mut(&mut self.state(), slot) {
            image.progress = percent;
        }
    }

    /// Upload the slot's file if it is new, otherwise reuse its asset.
    async fn resolve(&self, slot: Slot, image: &LocalImage, folder: &str) -> ClientResult<ImageAsset> {
        let file = match &image.source {
            ImageSource::Uploaded { url } => {
                return Ok(ImageAsset::new(url, image.width, image.height));
            }
            ImageSource::Pending(file) => file,
        };

        if let Some(img) = Self::slot_mut(&mut self.state(), slot) {
            img.uploading = true;
            img.progress = 0;
        }
        let report = |percent: u8| self.set_progress(slot, percent);
        let result = self
            .uploader
            .upload(file, &UploadOptions::in_folder(folder), Some(&report as &ProgressFn<'_>))
            .await;

        let mut state = self.state();
        let slot_ref = Self::slot_mut(&mut state, slot);
        match result {
            Ok(uploaded) => {
                if let Some(img) = slot_ref {
                    img.uploading = false;
                    img.source = ImageSource::Uploaded {
                        url: uploaded.url.clone(),
                    };
                }
                Ok(ImageAsset::new(uploaded.url, image.width, image.height))
            }
            Err(err) => {
                if let Some(img) = slot_ref {
                    img.uploading = false;
                }
                Err(err)
            }
        }
    }

    /// Validate, upload new images, then create or update the record.
    ///
    /// Returns the persisted record so the caller can reconcile its list.
    pub async fn submit(&self) -> ClientResult<Item> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Busy);
        }
        let _guard = SubmitGuard(&self.submitting);

        let FormState {
            fields,
            cover,
            details,
        } = self.state().clone();

        let Some(cover) = cover else {
            return Err(ClientError::Validation("please select a cover image".into()));
        };
        if fields.title.trim().is_empty() {
            return Err(ClientError::Validation("please enter a title".into()));
        }

        let cover_image = self.resolve(Slot::Cover, &cover, COVER_FOLDER).await?;

        let mut detail_images = Vec::with_capacity(details.len());
        for (index, image) in details.iter().enumerate() {
            detail_images.push(
                self.resolve(Slot::Detail(index), image, DETAIL_FOLDER)
                    .await?,
            );
        }

        let payload = ItemPayload {
            title: fields.title.trim().to_string(),
            variety: fields.variety.clone(),
            owner_name: fields.owner_name.trim().to_string(),
            description: fields.description.trim().to_string(),
            cover_image,
            detail_images: (!detail_images.is_empty()).then_some(detail_images),
            tags: build_tags(&fields),
        };

        let saved = match &self.editing {
            Some(id) => self.store.update_item(id, &payload).await,
            None => self.store.create_item(&payload).await,
        }
        .map_err(|err| match err {
            ClientError::Persistence(msg) if !msg.is_empty() => ClientError::Persistence(msg),
            other => {
                tracing::warn!(error = %other, "saving item failed");
                ClientError::Persistence(SAVE_FAILED.into())
            }
        })?;

        tracing::debug!(id = %saved.id, "item saved");
        Ok(saved)
    }
}
