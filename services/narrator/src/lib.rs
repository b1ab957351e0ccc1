//! Photo Narrator Service
//!
//! Accepts an uploaded photo, classifies it with an image-recognition
//! service, speaks the top label with a text-to-speech service, stores the
//! photo and the audio in S3 and records both in PostgreSQL. The results page
//! shows the latest photo with its spoken description.
//!
//! ## Architecture
//!
//! ```text
//!   Browser                                         S3 Bucket
//! ┌──────────────┐  POST /upload_photo            ┌──────────────┐
//! │ Upload form  │──────────────┐                 │ XXXXXX.jpg   │
//! └──────────────┘              ▼                 │ XXXXXX.mp3   │
//!                        ┌──────────────┐  put    └──────────────┘
//!                        │ Upload       │────────────────▲
//!                        │ Workflow     │                │
//!                        └──────────────┘                │ public URL
//!                          │    │    │                   │
//!              classify    │    │    │ record     ┌──────────────┐
//!         ┌────────────────┘    │    └───────────▶│ PostgreSQL   │
//!         ▼                     ▼ synthesize      │ images/audio │
//! ┌──────────────┐       ┌──────────────┐         └──────────────┘
//! │ Clarifai     │       │ Google TTS   │                │
//! └──────────────┘       └──────────────┘                ▼
//!                                                 ┌──────────────┐
//!                                                 │ GET /results │
//!                                                 └──────────────┘
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod metadata_store;
pub mod object_store;
pub mod pages;
pub mod speech;
pub mod web;
pub mod workflow;

pub use classifier::{ClarifaiClassifier, Concept, ImageClassifier};
pub use config::Config;
pub use error::{NarratorError, Result};
pub use metadata_store::{
    AudioRecord, ImageRecord, MetadataStore, PgMetadataStore, SubmissionSummary,
};
pub use object_store::{ObjectStore, S3ObjectStore, StoredObject};
pub use speech::{GoogleSpeechSynthesizer, SpeechSynthesizer};
pub use web::{create_router, AppState};
pub use workflow::{PhotoUpload, Submission, UploadWorkflow};
