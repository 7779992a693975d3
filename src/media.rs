//! Deepfake signal adapter over an external vision service
//!
//! Face detection runs as an asynchronous job on the service side. The
//! analyzer polls the job at a fixed interval until it completes or the
//! deadline passes, then forwards the confident faces for scoring.

use crate::error::{EngineError, ExternalError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Minimum face confidence (percent) forwarded for scoring
pub const DEFAULT_MIN_CONFIDENCE: f64 = 90.0;

/// Face bounding box in relative image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    /// Offset into the media in milliseconds
    pub timestamp_ms: u64,
    pub bounding_box: BoundingBox,
    /// Detection confidence, 0 to 100
    pub confidence: f64,
}

/// State of a face detection job
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    InProgress,
    Succeeded(Vec<FaceDetection>),
    Failed(String),
}

/// External vision and media-scoring service
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Start face detection over the media object, returning a job id
    async fn start_face_detection(&self, media_uri: &str) -> std::result::Result<String, ExternalError>;

    async fn face_detection_status(&self, job_id: &str) -> std::result::Result<JobStatus, ExternalError>;

    /// Deepfake likelihood in [0, 1] for the given faces
    async fn score_faces(&self, faces: &[FaceDetection]) -> std::result::Result<f64, ExternalError>;
}

/// Deepfake verdict for one media object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepfakeScore {
    pub media_uri: String,
    pub score: f64,
    pub faces_considered: usize,
}

pub struct DeepfakeAnalyzer {
    service: Arc<dyn VisionService>,
    poll_interval: Duration,
    deadline: Duration,
    min_confidence: f64,
}

impl DeepfakeAnalyzer {
    pub fn new(service: Arc<dyn VisionService>) -> Self {
        Self {
            service,
            poll_interval: Duration::from_secs(5),
            deadline: Duration::from_secs(300),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, deadline: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.deadline = deadline;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub async fn analyze(&self, media_uri: &str) -> Result<DeepfakeScore> {
        let job_id = self.service.start_face_detection(media_uri).await?;
        info!(media_uri = %media_uri, job_id = %job_id, "Face detection started");

        let faces = self.wait_for_faces(&job_id).await?;
        let confident: Vec<FaceDetection> = faces
            .into_iter()
            .filter(|f| f.confidence > self.min_confidence)
            .collect();

        if confident.is_empty() {
            return Err(EngineError::NoFacesDetected {
                min_confidence: self.min_confidence,
            });
        }

        let score = self.service.score_faces(&confident).await?.clamp(0.0, 1.0);
        debug!(media_uri = %media_uri, score = score, faces = confident.len(), "Media scored");

        Ok(DeepfakeScore {
            media_uri: media_uri.to_string(),
            score,
            faces_considered: confident.len(),
        })
    }

    async fn wait_for_faces(&self, job_id: &str) -> Result<Vec<FaceDetection>> {
        let deadline = Instant::now() + self.deadline;
        loop {
            let status = tokio::time::timeout_at(deadline, self.service.face_detection_status(job_id))
                .await
                .map_err(|_| EngineError::Timeout(self.deadline))??;
            match status {
                JobStatus::Succeeded(faces) => return Ok(faces),
                JobStatus::Failed(reason) => {
                    warn!(job_id = %job_id, reason = %reason, "Face detection failed");
                    return Err(ExternalError::fatal("vision", reason).into());
                }
                JobStatus::InProgress => {}
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(EngineError::Timeout(self.deadline));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockVision {
        polls_until_done: usize,
        polls: AtomicUsize,
        outcome: JobStatus,
        scored: Mutex<Vec<FaceDetection>>,
    }

    impl MockVision {
        fn new(polls_until_done: usize, outcome: JobStatus) -> Self {
            Self {
                polls_until_done,
                polls: AtomicUsize::new(0),
                outcome,
                scored: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VisionService for MockVision {
        async fn start_face_detection(&self, _media_uri: &str) -> std::result::Result<String, ExternalError> {
            Ok("job-1".to_string())
        }

        async fn face_detection_status(&self, _job_id: &str) -> std::result::Result<JobStatus, ExternalError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < self.polls_until_done {
                Ok(JobStatus::InProgress)
            } else {
                Ok(self.outcome.clone())
            }
        }

        async fn score_faces(&self, faces: &[FaceDetection]) -> std::result::Result<f64, ExternalError> {
            self.scored.lock().unwrap().extend_from_slice(faces);
            Ok(0.8)
        }
    }

    fn face(confidence: f64) -> FaceDetection {
        FaceDetection {
            timestamp_ms: 1000,
            bounding_box: BoundingBox {
                left: 0.1,
                top: 0.1,
                width: 0.3,
                height: 0.4,
            },
            confidence,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_low_confidence_faces() {
        let vision = Arc::new(MockVision::new(
            3,
            JobStatus::Succeeded(vec![face(99.9), face(85.0), face(90.0)]),
        ));
        let analyzer = DeepfakeAnalyzer::new(vision.clone())
            .with_polling(Duration::from_secs(1), Duration::from_secs(30));

        let result = analyzer.analyze("mem://video.mp4").await.unwrap();
        assert_eq!(result.faces_considered, 1);
        assert_eq!(result.score, 0.8);
        assert_eq!(vision.polls.load(Ordering::SeqCst), 3);
        assert_eq!(vision.scored.lock().unwrap()[0].confidence, 99.9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_confident_faces() {
        let vision = Arc::new(MockVision::new(1, JobStatus::Succeeded(vec![face(50.0)])));
        let err = DeepfakeAnalyzer::new(vision).analyze("mem://v").await.unwrap_err();
        assert!(matches!(err, EngineError::NoFacesDetected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_confidence_floor() {
        let vision = Arc::new(MockVision::new(1, JobStatus::Succeeded(vec![face(50.0), face(20.0)])));
        let result = DeepfakeAnalyzer::new(vision)
            .with_min_confidence(40.0)
            .analyze("mem://v")
            .await
            .unwrap();
        assert_eq!(result.faces_considered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let vision = Arc::new(MockVision::new(usize::MAX, JobStatus::InProgress));
        let analyzer = DeepfakeAnalyzer::new(vision)
            .with_polling(Duration::from_secs(5), Duration::from_secs(20));
        let err = analyzer.analyze("mem://v").await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }

    struct HungVision;

    #[async_trait]
    impl VisionService for HungVision {
        async fn start_face_detection(&self, _media_uri: &str) -> std::result::Result<String, ExternalError> {
            Ok("job-2".to_string())
        }

        async fn face_detection_status(&self, _job_id: &str) -> std::result::Result<JobStatus, ExternalError> {
            std::future::pending().await
        }

        async fn score_faces(&self, _faces: &[FaceDetection]) -> std::result::Result<f64, ExternalError> {
            Ok(0.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_status_call_hits_deadline() {
        let analyzer = DeepfakeAnalyzer::new(Arc::new(HungVision))
            .with_polling(Duration::from_secs(5), Duration::from_secs(20));

        let started = Instant::now();
        let err = analyzer.analyze("mem://v").await.unwrap_err();

        assert!(matches!(err, EngineError::Timeout(d) if d == Duration::from_secs(20)));
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_fatal() {
        let vision = Arc::new(MockVision::new(1, JobStatus::Failed("bad codec".into())));
        let err = DeepfakeAnalyzer::new(vision).analyze("mem://v").await.unwrap_err();
        assert!(matches!(err, EngineError::External(_)));
        assert!(!err.is_retryable());
    }
}
