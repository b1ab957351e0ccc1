//! Upload workflow.
//!
//! Drives one submitted photo through the collaborators in order:
//!
//! ```text
//! upload photo (public) -> classify by URL -> synthesize label
//!        -> upload audio (public) -> record image + audio
//! ```
//!
//! The photo must be public before it can be classified, and the label must
//! exist before it can be spoken, so the steps run sequentially. Objects
//! uploaded by a submission that later fails are deleted again. Uploads never
//! replace an existing object, so that cleanup only ever touches objects the
//! failed submission created itself.

use crate::classifier::ImageClassifier;
use crate::config::UploadConfig;
use crate::error::{NarratorError, Result};
use crate::metadata_store::{AudioRecord, ImageRecord, MetadataStore};
use crate::object_store::{ObjectStore, StoredObject};
use crate::speech::SpeechSynthesizer;
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Characters object names are drawn from
pub const OBJECT_NAME_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a generated object name, excluding the extension
pub const OBJECT_NAME_LEN: usize = 6;

/// Photos are stored as `.jpg` whatever their actual format
pub const IMAGE_EXTENSION: &str = "jpg";

pub const AUDIO_EXTENSION: &str = "mp3";

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Names drawn for one object before giving up on a crowded namespace
pub const MAX_NAME_ATTEMPTS: usize = 5;

/// A photo received from the upload form
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    /// Raw file bytes
    pub data: Vec<u8>,
    /// Content type declared by the client
    pub content_type: String,
    /// Original file name, if the client sent one
    pub file_name: Option<String>,
}

/// Records produced by one completed submission
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub submission_id: Uuid,
    pub image: ImageRecord,
    pub audio: AudioRecord,
}

/// Step of the workflow, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ImageUpload,
    Classification,
    Synthesis,
    AudioUpload,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ImageUpload => "image_upload",
            Stage::Classification => "classification",
            Stage::Synthesis => "synthesis",
            Stage::AudioUpload => "audio_upload",
            Stage::Persist => "persist",
        }
    }
}

/// Random object name of [`OBJECT_NAME_LEN`] characters from [`OBJECT_NAME_ALPHABET`]
pub fn generate_object_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..OBJECT_NAME_LEN)
        .map(|_| OBJECT_NAME_ALPHABET[rng.gen_range(0..OBJECT_NAME_ALPHABET.len())] as char)
        .collect()
}

/// Fresh object key with the given extension
fn new_object_key(extension: &str) -> String {
    format!("{}.{}", generate_object_name(&mut rand::thread_rng()), extension)
}

/// Current time as fractional seconds since the Unix epoch
fn capture_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Orchestrates storage, classification, synthesis and metadata for a photo
pub struct UploadWorkflow {
    object_store: Arc<dyn ObjectStore>,
    metadata_store: Arc<dyn MetadataStore>,
    classifier: Arc<dyn ImageClassifier>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: UploadConfig,
}

impl UploadWorkflow {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        metadata_store: Arc<dyn MetadataStore>,
        classifier: Arc<dyn ImageClassifier>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: UploadConfig,
    ) -> Self {
        Self {
            object_store,
            metadata_store,
            classifier,
            synthesizer,
            config,
        }
    }

    /// Largest accepted photo in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes
    }

    /// Reject uploads the collaborators should never see
    pub fn validate(&self, upload: &PhotoUpload) -> Result<()> {
        if upload.data.is_empty() {
            return Err(NarratorError::InvalidUpload("file is empty".to_string()));
        }

        if upload.data.len() > self.config.max_upload_bytes {
            return Err(NarratorError::UploadTooLarge {
                limit: self.config.max_upload_bytes,
            });
        }

        let content_type = upload.content_type.to_ascii_lowercase();
        let allowed = self.config.allowed_content_types.is_empty()
            || self
                .config
                .allowed_content_types
                .iter()
                .any(|prefix| content_type.starts_with(&prefix.to_ascii_lowercase()));

        if !allowed {
            return Err(NarratorError::UnsupportedMediaType(upload.content_type.clone()));
        }

        Ok(())
    }

    /// Run one submission end to end
    #[instrument(
        skip(self, upload),
        fields(
            content_type = %upload.content_type,
            size_bytes = upload.data.len(),
            file_name = upload.file_name.as_deref().unwrap_or("")
        )
    )]
    pub async fn submit(&self, upload: PhotoUpload) -> Result<Submission> {
        self.validate(&upload)?;

        let submission_id = Uuid::new_v4();
        let started = Instant::now();
        let mut uploaded = Vec::new();

        match self.run(submission_id, upload, &mut uploaded).await {
            Ok(submission) => {
                metrics::counter!("narrator.submissions.completed").increment(1);
                metrics::histogram!("narrator.submission.duration_seconds")
                    .record(started.elapsed().as_secs_f64());

                info!(
                    submission_id = %submission_id,
                    image = %submission.image.name,
                    audio = %submission.audio.name,
                    label = %submission.image.best,
                    "Submission completed"
                );

                Ok(submission)
            }
            Err((stage, e)) => {
                metrics::counter!("narrator.submissions.failed", "stage" => stage.as_str())
                    .increment(1);

                warn!(
                    submission_id = %submission_id,
                    stage = stage.as_str(),
                    error = %e,
                    "Submission failed"
                );

                self.compensate(&uploaded).await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        submission_id: Uuid,
        upload: PhotoUpload,
        uploaded: &mut Vec<String>,
    ) -> std::result::Result<Submission, (Stage, NarratorError)> {
        let PhotoUpload {
            data, content_type, ..
        } = upload;

        let image = self
            .put_new_object(IMAGE_EXTENSION, Bytes::from(data), &content_type)
            .await
            .map_err(|e| (Stage::ImageUpload, e))?;
        uploaded.push(image.key.clone());

        let concepts = self
            .classifier
            .classify_url(&image.public_url)
            .await
            .map_err(|e| (Stage::Classification, e))?;

        let (label, confidence) = match concepts.into_iter().next() {
            Some(concept) => (concept.id, Some(concept.value)),
            None => match self.config.fallback_label {
                Some(ref fallback) => {
                    warn!(image = %image.key, label = %fallback, "No concepts returned, using fallback label");
                    (fallback.clone(), None)
                }
                None => return Err((Stage::Classification, NarratorError::EmptyClassification)),
            },
        };

        let speech = self
            .synthesizer
            .synthesize(&label)
            .await
            .map_err(|e| (Stage::Synthesis, e))?;

        let audio = self
            .put_new_object(AUDIO_EXTENSION, Bytes::from(speech), AUDIO_CONTENT_TYPE)
            .await
            .map_err(|e| (Stage::AudioUpload, e))?;
        uploaded.push(audio.key.clone());

        // One capture time, taken after the audio exists, shared by both records
        let timestamp = capture_timestamp();

        let image_record =
            build_image_record(submission_id, &image, &content_type, label, confidence, timestamp);
        let audio_record = build_audio_record(submission_id, &audio, timestamp);

        self.metadata_store
            .record_submission(&image_record, &audio_record)
            .await
            .map_err(|e| (Stage::Persist, e))?;

        Ok(Submission {
            submission_id,
            image: image_record,
            audio: audio_record,
        })
    }

    /// Store `data` under a generated name, drawing again while the name is taken
    async fn put_new_object(
        &self,
        extension: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject> {
        let mut attempt = 1;
        loop {
            let key = new_object_key(extension);
            match self
                .object_store
                .put_public(&key, data.clone(), content_type)
                .await
            {
                Err(NarratorError::ObjectExists(_)) if attempt < MAX_NAME_ATTEMPTS => {
                    metrics::counter!("narrator.object_names.collisions").increment(1);
                    warn!(key = %key, attempt = attempt, "Object name already taken, drawing another");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Delete objects left behind by a failed submission
    async fn compensate(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        let results = join_all(keys.iter().map(|key| self.object_store.delete(key))).await;

        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(()) => info!(key = %key, "Removed object from failed submission"),
                Err(e) => warn!(key = %key, error = %e, "Failed to remove orphaned object"),
            }
        }
    }
}

fn build_image_record(
    submission_id: Uuid,
    object: &StoredObject,
    content_type: &str,
    best: String,
    confidence: Option<f32>,
    timestamp: f64,
) -> ImageRecord {
    ImageRecord {
        name: object.key.clone(),
        submission_id,
        blob_name: object.key.clone(),
        image_public_url: object.public_url.clone(),
        timestamp,
        best,
        confidence,
        content_type: content_type.to_string(),
        size_bytes: object.size_bytes as i64,
    }
}

fn build_audio_record(submission_id: Uuid, object: &StoredObject, timestamp: f64) -> AudioRecord {
    AudioRecord {
        name: object.key.clone(),
        submission_id,
        blob_name: object.key.clone(),
        speech_public_url: object.public_url.clone(),
        timestamp,
        size_bytes: object.size_bytes as i64,
    }
}
