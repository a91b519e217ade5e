//! Job queue using Redis Streams.

use std::collections::HashMap;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobLane, ProcessSessionJob, QueueJob, RenderSlideshowJob, SweepJob};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream for ingestion and sweep jobs
    pub ingest_stream: String,
    /// Stream for slideshow renders
    pub render_stream: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// How long a duplicate enqueue is rejected
    pub dedup_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            ingest_stream: "showcase:jobs".to_string(),
            render_stream: "showcase:renders".to_string(),
            consumer_group: "showcase:workers".to_string(),
            dlq_stream_name: "showcase:dlq".to_string(),
            max_retries: 3,
            dedup_ttl_secs: 3600,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            ingest_stream: std::env::var("SHOWCASE_QUEUE_STREAM").unwrap_or(defaults.ingest_stream),
            render_stream: std::env::var("SHOWCASE_RENDER_STREAM").unwrap_or(defaults.render_stream),
            consumer_group: std::env::var("SHOWCASE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("SHOWCASE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("SHOWCASE_QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            dedup_ttl_secs: std::env::var("SHOWCASE_QUEUE_DEDUP_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.dedup_ttl_secs),
        }
    }

    pub fn stream_for(&self, lane: JobLane) -> &str {
        match lane {
            JobLane::Ingest => &self.ingest_stream,
            JobLane::Render => &self.render_stream,
        }
    }
}

/// A job read from a stream, with what is needed to ack it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub lane: JobLane,
    pub job: QueueJob,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Initialize the queue (create consumer groups if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for lane in [JobLane::Ingest, JobLane::Render] {
            let stream = self.config.stream_for(lane);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group {} on {}", self.config.consumer_group, stream),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Round-trip to Redis.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Enqueue an ingestion job.
    pub async fn enqueue_process(&self, job: ProcessSessionJob) -> QueueResult<String> {
        self.enqueue(QueueJob::ProcessSession(job)).await
    }

    /// Enqueue a slideshow render.
    pub async fn enqueue_render(&self, job: RenderSlideshowJob) -> QueueResult<String> {
        self.enqueue(QueueJob::RenderSlideshow(job)).await
    }

    /// Enqueue a sweep.
    pub async fn enqueue_sweep(&self, job: SweepJob) -> QueueResult<String> {
        self.enqueue(QueueJob::Sweep(job)).await
    }

    /// Enqueue a job.
    pub async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();

        // SET NX claims the key atomically; losing the race means a duplicate.
        let dedup_key = format!("showcase:dedup:{}", idempotency_key);
        let claimed: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl_secs)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !claimed {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let stream = self.config.stream_for(job.lane());
        let result: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match result {
            Ok(id) => id,
            Err(e) => {
                // Release the claim so the caller can retry.
                conn.del::<_, ()>(&dedup_key).await.ok();
                return Err(e.into());
            }
        };

        info!(
            "Enqueued {} job {} on {} with message ID {}",
            job.kind(),
            job.job_id(),
            stream,
            message_id
        );

        Ok(message_id)
    }

    /// Drop the dedup claim for a job so it can be submitted again.
    pub async fn release(&self, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let dedup_key = format!("showcase:dedup:{}", job.idempotency_key());
        conn.del::<_, ()>(&dedup_key).await?;
        Ok(())
    }

    /// Acknowledge a job (mark as completed).
    pub async fn ack(&self, lane: JobLane, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.config.stream_for(lane);

        redis::cmd("XACK")
            .arg(stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        let retry_key = format!("showcase:retry:{}", message_id);
        conn.del::<_, ()>(&retry_key).await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .arg("lane")
            .arg(delivery.lane.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery.lane, &delivery.message_id).await?;

        warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    /// Get queue length for a lane.
    pub async fn len(&self, lane: JobLane) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.config.stream_for(lane)).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Consume new jobs.
    ///
    /// Ingestion jobs are taken first without blocking; only when that lane is
    /// empty does the call block on both lanes.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let urgent = self
            .read_group(consumer_name, &[JobLane::Ingest], None, count)
            .await?;
        if !urgent.is_empty() {
            return Ok(urgent);
        }
        self.read_group(
            consumer_name,
            &[JobLane::Ingest, JobLane::Render],
            Some(block_ms),
            count,
        )
        .await
    }

    async fn read_group(
        &self,
        consumer_name: &str,
        lanes: &[JobLane],
        block_ms: Option<u64>,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("STREAMS");
        for lane in lanes {
            cmd.arg(self.config.stream_for(*lane));
        }
        for _ in lanes {
            cmd.arg(">"); // Only new messages
        }

        let result: Option<redis::streams::StreamReadReply> = cmd.query_async(&mut conn).await?;
        let Some(result) = result else {
            return Ok(Vec::new());
        };

        let mut jobs = Vec::new();
        for stream_key in result.keys {
            let Some(lane) = self.lane_of(&stream_key.key) else {
                continue;
            };
            for entry in stream_key.ids {
                if let Some(delivery) = self.decode(lane, entry.id, &entry.map).await {
                    debug!("Consumed job {} from {}", delivery.job.job_id(), stream_key.key);
                    jobs.push(delivery);
                }
            }
        }

        Ok(jobs)
    }

    /// Claim jobs from crashed workers that have been pending for too long.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut jobs = Vec::new();

        for lane in [JobLane::Ingest, JobLane::Render] {
            let stream = self.config.stream_for(lane);

            let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg("IDLE")
                .arg(min_idle_ms)
                .arg("-")
                .arg("+")
                .arg(count)
                .query_async(&mut conn)
                .await?;

            if pending.ids.is_empty() {
                continue;
            }

            let mut claim = redis::cmd("XCLAIM");
            claim
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg(consumer_name)
                .arg(min_idle_ms);
            for p in &pending.ids {
                claim.arg(&p.id);
            }
            let claimed: redis::streams::StreamClaimReply = claim.query_async(&mut conn).await?;

            for entry in claimed.ids {
                if let Some(delivery) = self.decode(lane, entry.id, &entry.map).await {
                    info!("Claimed pending job {} from {}", delivery.job.job_id(), stream);
                    jobs.push(delivery);
                }
            }
        }

        Ok(jobs)
    }

    fn lane_of(&self, stream: &str) -> Option<JobLane> {
        [JobLane::Ingest, JobLane::Render]
            .into_iter()
            .find(|lane| self.config.stream_for(*lane) == stream)
    }

    /// Parse an entry; malformed payloads are acked so they are not redelivered.
    async fn decode(
        &self,
        lane: JobLane,
        message_id: String,
        map: &HashMap<String, redis::Value>,
    ) -> Option<Delivery> {
        let payload = match map.get("job") {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            Some(redis::Value::SimpleString(s)) => s.clone(),
            _ => {
                warn!("Stream entry {} has no job payload", message_id);
                self.ack(lane, &message_id).await.ok();
                return None;
            }
        };
        match serde_json::from_str::<QueueJob>(&payload) {
            Ok(job) => Some(Delivery {
                message_id,
                lane,
                job,
            }),
            Err(e) => {
                warn!("Failed to parse job payload: {}", e);
                self.ack(lane, &message_id).await.ok();
                None
            }
        }
    }

    /// Get retry count for a job from its metadata.
    pub async fn get_retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("showcase:retry:{}", message_id);
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment retry count for a job.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = format!("showcase:retry:{}", message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        // Set TTL to 24 hours
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use showcase_models::{SessionId, SourceKind};

    #[test]
    fn test_stream_per_lane() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_for(JobLane::Ingest), "showcase:jobs");
        assert_eq!(config.stream_for(JobLane::Render), "showcase:renders");

        let queue = JobQueue::new(config).unwrap();
        assert_eq!(queue.lane_of("showcase:renders"), Some(JobLane::Render));
        assert_eq!(queue.lane_of("other"), None);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_enqueue_consume_ack() {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let config = QueueConfig {
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ingest_stream: format!("test:jobs:{}", suffix),
            render_stream: format!("test:renders:{}", suffix),
            consumer_group: format!("test:group:{}", suffix),
            dlq_stream_name: format!("test:dlq:{}", suffix),
            ..Default::default()
        };
        let queue = JobQueue::new(config).unwrap();
        queue.init().await.unwrap();

        let session = SessionId::from_string(format!("s-{}", suffix));
        let job = ProcessSessionJob::new(session.clone(), SourceKind::Upload);
        queue.enqueue_process(job.clone()).await.unwrap();

        let dup = queue.enqueue_process(job.clone()).await;
        assert!(matches!(dup, Err(QueueError::Duplicate(_))));

        let deliveries = queue.consume("c1", 100, 10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].lane, JobLane::Ingest);
        assert_eq!(deliveries[0].job.session_id(), Some(&session));

        queue.ack(deliveries[0].lane, &deliveries[0].message_id).await.unwrap();
        assert_eq!(queue.len(JobLane::Ingest).await.unwrap(), 0);
        queue.release(&deliveries[0].job).await.unwrap();
    }
}
