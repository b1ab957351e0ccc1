#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mockall::mock;
use narrator::config::{ApiConfig, UploadConfig};
use narrator::{
    create_router, AppState, AudioRecord, Concept, ImageClassifier, ImageRecord, MetadataStore,
    NarratorError, ObjectStore, Result, SpeechSynthesizer, StoredObject, SubmissionSummary,
    UploadWorkflow,
};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const PUBLIC_BASE: &str = "https://media.example.com";

mock! {
    pub Classifier {}

    #[async_trait]
    impl ImageClassifier for Classifier {
        async fn classify_url(&self, image_url: &str) -> Result<Vec<Concept>>;
    }
}

mock! {
    pub Synthesizer {}

    #[async_trait]
    impl SpeechSynthesizer for Synthesizer {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
    }
}

pub fn concept(id: &str, value: f32) -> Concept {
    Concept {
        id: id.to_string(),
        name: id.to_string(),
        value,
    }
}

/// Classifier answering every request with the given concepts
pub fn classifier_returning(concepts: Vec<Concept>) -> MockClassifier {
    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify_url()
        .returning(move |_| Ok(concepts.clone()));
    classifier
}

/// Synthesizer answering every request with the given bytes
pub fn synthesizer_returning(audio: &'static [u8]) -> MockSynthesizer {
    let mut synthesizer = MockSynthesizer::new();
    synthesizer
        .expect_synthesize()
        .returning(move |_| Ok(audio.to_vec()));
    synthesizer
}

/// An object written through [`MemoryObjectStore`]
#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Object store keeping everything in memory.
/// Every stored object counts as public, and existing keys are never replaced.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<Vec<PutObject>>,
    deleted: Mutex<Vec<String>>,
    attempted: Mutex<Vec<String>>,
    fail_suffix: Option<String>,
    collisions: Mutex<usize>,
}

impl MemoryObjectStore {
    /// Store that rejects keys ending in `suffix`
    pub fn failing_on(suffix: &str) -> Self {
        Self {
            fail_suffix: Some(suffix.to_string()),
            ..Default::default()
        }
    }

    /// Store that reports the next `count` keys as already taken
    pub fn colliding(count: usize) -> Self {
        Self {
            collisions: Mutex::new(count),
            ..Default::default()
        }
    }

    /// Add an object written by someone else
    pub fn with_object(self, key: &str, data: &[u8]) -> Self {
        self.objects.lock().unwrap().push(PutObject {
            key: key.to_string(),
            data: data.to_vec(),
            content_type: "image/jpeg".to_string(),
        });
        self
    }

    /// Every key a write was attempted for, in order
    pub fn attempted(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn objects(&self) -> Vec<PutObject> {
        self.objects.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_public(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject> {
        self.attempted.lock().unwrap().push(key.to_string());

        if let Some(ref suffix) = self.fail_suffix {
            if key.ends_with(suffix.as_str()) {
                return Err(NarratorError::ObjectStore(format!("access denied for {}", key)));
            }
        }

        {
            let mut collisions = self.collisions.lock().unwrap();
            if *collisions > 0 {
                *collisions -= 1;
                return Err(NarratorError::ObjectExists(key.to_string()));
            }
        }

        let mut objects = self.objects.lock().unwrap();
        if objects.iter().any(|o| o.key == key) {
            return Err(NarratorError::ObjectExists(key.to_string()));
        }

        let size_bytes = data.len();
        objects.push(PutObject {
            key: key.to_string(),
            data: data.to_vec(),
            content_type: content_type.to_string(),
        });

        Ok(StoredObject {
            key: key.to_string(),
            public_url: format!("{}/{}", PUBLIC_BASE, key),
            size_bytes,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().retain(|o| o.key != key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Metadata store keeping records in memory
#[derive(Default)]
pub struct MemoryMetadataStore {
    images: Mutex<Vec<ImageRecord>>,
    audio: Mutex<Vec<AudioRecord>>,
    unavailable: bool,
}

impl MemoryMetadataStore {
    /// Store whose every call fails as if the database were down
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// Store holding records written outside the workflow
    pub fn seeded(images: Vec<ImageRecord>, audio: Vec<AudioRecord>) -> Self {
        Self {
            images: Mutex::new(images),
            audio: Mutex::new(audio),
            ..Default::default()
        }
    }

    pub fn images(&self) -> Vec<ImageRecord> {
        self.images.lock().unwrap().clone()
    }

    pub fn audio(&self) -> Vec<AudioRecord> {
        self.audio.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            Err(NarratorError::MetadataStore("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

fn newest_first(a_ts: f64, a_name: &str, b_ts: f64, b_name: &str) -> Ordering {
    b_ts.partial_cmp(&a_ts)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b_name.cmp(a_name))
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn record_submission(&self, image: &ImageRecord, audio: &AudioRecord) -> Result<()> {
        self.check()?;
        self.images.lock().unwrap().push(image.clone());
        self.audio.lock().unwrap().push(audio.clone());
        Ok(())
    }

    async fn latest_image(&self) -> Result<Option<ImageRecord>> {
        self.check()?;
        let mut images = self.images();
        images.sort_by(|a, b| newest_first(a.timestamp, &a.name, b.timestamp, &b.name));
        Ok(images.into_iter().next())
    }

    async fn latest_audio(&self) -> Result<Option<AudioRecord>> {
        self.check()?;
        let mut audio = self.audio();
        audio.sort_by(|a, b| newest_first(a.timestamp, &a.name, b.timestamp, &b.name));
        Ok(audio.into_iter().next())
    }

    async fn audio_for_submission(&self, submission_id: Uuid) -> Result<Option<AudioRecord>> {
        self.check()?;
        Ok(self
            .audio()
            .into_iter()
            .find(|a| a.submission_id == submission_id))
    }

    async fn recent_submissions(&self, limit: i64, offset: i64) -> Result<Vec<SubmissionSummary>> {
        self.check()?;
        let mut images = self.images();
        images.sort_by(|a, b| newest_first(a.timestamp, &a.name, b.timestamp, &b.name));
        let audio = self.audio();
        Ok(images
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|image| SubmissionSummary {
                audio: audio
                    .iter()
                    .find(|a| a.submission_id == image.submission_id)
                    .cloned(),
                image,
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

/// Everything a test needs to drive and inspect one service instance
pub struct Harness {
    pub objects: Arc<MemoryObjectStore>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub workflow: Arc<UploadWorkflow>,
}

impl Harness {
    pub fn new(classifier: MockClassifier, synthesizer: MockSynthesizer) -> Self {
        Self::with(
            MemoryObjectStore::default(),
            MemoryMetadataStore::default(),
            classifier,
            synthesizer,
            UploadConfig::default(),
        )
    }

    pub fn with(
        objects: MemoryObjectStore,
        metadata: MemoryMetadataStore,
        classifier: MockClassifier,
        synthesizer: MockSynthesizer,
        config: UploadConfig,
    ) -> Self {
        let objects = Arc::new(objects);
        let metadata = Arc::new(metadata);
        let workflow = Arc::new(UploadWorkflow::new(
            objects.clone(),
            metadata.clone(),
            Arc::new(classifier),
            Arc::new(synthesizer),
            config,
        ));

        Self {
            objects,
            metadata,
            workflow,
        }
    }

    pub fn router(&self) -> axum::Router {
        create_router(
            AppState {
                workflow: self.workflow.clone(),
                metadata_store: self.metadata.clone(),
            },
            &ApiConfig::default(),
        )
    }
}

/// Image record as written by an earlier deployment
pub fn image_record(name: &str, submission_id: Uuid, timestamp: f64, best: &str) -> ImageRecord {
    ImageRecord {
        name: name.to_string(),
        submission_id,
        blob_name: name.to_string(),
        image_public_url: format!("{}/{}", PUBLIC_BASE, name),
        timestamp,
        best: best.to_string(),
        confidence: None,
        content_type: "image/jpeg".to_string(),
        size_bytes: 9,
    }
}

/// Audio record as written by an earlier deployment
pub fn audio_record(name: &str, submission_id: Uuid, timestamp: f64) -> AudioRecord {
    AudioRecord {
        name: name.to_string(),
        submission_id,
        blob_name: name.to_string(),
        speech_public_url: format!("{}/{}", PUBLIC_BASE, name),
        timestamp,
        size_bytes: 9,
    }
}

/// `multipart/form-data` body with a single file field
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "narrator-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// True when `key` is six characters from `[A-Z0-9]` followed by `.ext`
pub fn is_generated_key(key: &str, ext: &str) -> bool {
    match key.split_once('.') {
        Some((name, e)) => {
            e == ext
                && name.len() == 6
                && name
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        }
        None => false,
    }
}
