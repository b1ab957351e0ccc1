use crate::config::DatabaseConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Stored metadata for an uploaded photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ImageRecord {
    /// Entity name (`<id>.jpg`)
    pub name: String,
    /// Submission shared with the paired audio record
    pub submission_id: Uuid,
    /// Object store key
    pub blob_name: String,
    /// Public address of the photo
    pub image_public_url: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Top classification label
    pub best: String,
    /// Score of the top concept, when reported
    pub confidence: Option<f32>,
    /// Content type the photo was uploaded with
    pub content_type: String,
    /// Photo size in bytes
    pub size_bytes: i64,
}

/// Stored metadata for a synthesized description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AudioRecord {
    /// Entity name (`<id>.mp3`)
    pub name: String,
    /// Submission shared with the paired image record
    pub submission_id: Uuid,
    /// Object store key
    pub blob_name: String,
    /// Public address of the audio
    pub speech_public_url: String,
    /// Seconds since the Unix epoch, equal to the paired image's
    pub timestamp: f64,
    /// Audio size in bytes
    pub size_bytes: i64,
}

/// An image record with the audio of the same submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionSummary {
    pub image: ImageRecord,
    pub audio: Option<AudioRecord>,
}

/// One `images LEFT JOIN audio` row
#[derive(Debug, FromRow)]
struct SubmissionRow {
    name: String,
    submission_id: Uuid,
    blob_name: String,
    image_public_url: String,
    timestamp: f64,
    best: String,
    confidence: Option<f32>,
    content_type: String,
    size_bytes: i64,
    audio_name: Option<String>,
    audio_blob_name: Option<String>,
    speech_public_url: Option<String>,
    audio_timestamp: Option<f64>,
    audio_size_bytes: Option<i64>,
}

impl From<SubmissionRow> for SubmissionSummary {
    fn from(row: SubmissionRow) -> Self {
        let audio = match (
            row.audio_name,
            row.audio_blob_name,
            row.speech_public_url,
            row.audio_timestamp,
            row.audio_size_bytes,
        ) {
            (Some(name), Some(blob_name), Some(speech_public_url), Some(timestamp), Some(size_bytes)) => {
                Some(AudioRecord {
                    name,
                    submission_id: row.submission_id,
                    blob_name,
                    speech_public_url,
                    timestamp,
                    size_bytes,
                })
            }
            _ => None,
        };

        SubmissionSummary {
            image: ImageRecord {
                name: row.name,
                submission_id: row.submission_id,
                blob_name: row.blob_name,
                image_public_url: row.image_public_url,
                timestamp: row.timestamp,
                best: row.best,
                confidence: row.confidence,
                content_type: row.content_type,
                size_bytes: row.size_bytes,
            },
            audio,
        }
    }
}

/// Persistent store for image and audio records
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist both records of one submission, image first, atomically
    async fn record_submission(&self, image: &ImageRecord, audio: &AudioRecord) -> Result<()>;

    /// Most recent image record by timestamp
    async fn latest_image(&self) -> Result<Option<ImageRecord>>;

    /// Most recent audio record by timestamp
    async fn latest_audio(&self) -> Result<Option<AudioRecord>>;

    /// Audio record written by the given submission
    async fn audio_for_submission(&self, submission_id: Uuid) -> Result<Option<AudioRecord>>;

    /// Image records newest first, each with the audio of its submission
    async fn recent_submissions(&self, limit: i64, offset: i64) -> Result<Vec<SubmissionSummary>>;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Latest image with the audio of the same submission.
    /// Falls back to the latest audio record when the pair is missing, and to
    /// no audio at all when none was ever recorded.
    async fn latest_pair(&self) -> Result<Option<(ImageRecord, Option<AudioRecord>)>> {
        let Some(image) = self.latest_image().await? else {
            return Ok(None);
        };

        let audio = match self.audio_for_submission(image.submission_id).await? {
            Some(audio) => Some(audio),
            None => self.latest_audio().await?,
        };

        Ok(Some((image, audio)))
    }
}

/// PostgreSQL-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(skip(self, image, audio), fields(submission_id = %image.submission_id))]
    async fn record_submission(&self, image: &ImageRecord, audio: &AudioRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO images (
                name, submission_id, blob_name, image_public_url,
                timestamp, best, confidence, content_type, size_bytes
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9
            )
            "#,
        )
        .bind(&image.name)
        .bind(image.submission_id)
        .bind(&image.blob_name)
        .bind(&image.image_public_url)
        .bind(image.timestamp)
        .bind(&image.best)
        .bind(image.confidence)
        .bind(&image.content_type)
        .bind(image.size_bytes)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO audio (
                name, submission_id, blob_name, speech_public_url,
                timestamp, size_bytes
            ) VALUES (
                $1, $2, $3, $4, $5, $6
            )
            "#,
        )
        .bind(&audio.name)
        .bind(audio.submission_id)
        .bind(&audio.blob_name)
        .bind(&audio.speech_public_url)
        .bind(audio.timestamp)
        .bind(audio.size_bytes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            image = %image.name,
            audio = %audio.name,
            "Submission recorded"
        );

        metrics::counter!("narrator.records.written").increment(2);

        Ok(())
    }

    async fn latest_image(&self) -> Result<Option<ImageRecord>> {
        let image = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT name, submission_id, blob_name, image_public_url,
                   timestamp, best, confidence, content_type, size_bytes
            FROM images
            ORDER BY timestamp DESC, name DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(image)
    }

    async fn latest_audio(&self) -> Result<Option<AudioRecord>> {
        let audio = sqlx::query_as::<_, AudioRecord>(
            r#"
            SELECT name, submission_id, blob_name, speech_public_url,
                   timestamp, size_bytes
            FROM audio
            ORDER BY timestamp DESC, name DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(audio)
    }

    async fn audio_for_submission(&self, submission_id: Uuid) -> Result<Option<AudioRecord>> {
        let audio = sqlx::query_as::<_, AudioRecord>(
            r#"
            SELECT name, submission_id, blob_name, speech_public_url,
                   timestamp, size_bytes
            FROM audio
            WHERE submission_id = $1
            LIMIT 1
            "#,
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(audio)
    }

    #[instrument(skip(self))]
    async fn recent_submissions(&self, limit: i64, offset: i64) -> Result<Vec<SubmissionSummary>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT i.name, i.submission_id, i.blob_name, i.image_public_url,
                   i.timestamp, i.best, i.confidence, i.content_type, i.size_bytes,
                   a.name AS audio_name,
                   a.blob_name AS audio_blob_name,
                   a.speech_public_url,
                   a.timestamp AS audio_timestamp,
                   a.size_bytes AS audio_size_bytes
            FROM images i
            LEFT JOIN audio a ON a.submission_id = i.submission_id
            ORDER BY i.timestamp DESC, i.name DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SubmissionSummary::from).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
