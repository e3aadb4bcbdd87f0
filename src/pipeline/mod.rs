//! Detection Enrichment Pipeline
//!
//! One linear, synchronous pass per uploaded image:
//! raw boxes -> normalized -> deduplicated -> annotated -> persisted record.
//! No stage mutates a previous stage's output; each produces a new sequence.
//!
//! Error taxonomy: malformed raw boxes are dropped per-box with a warning
//! (never fatal), a failed detector call is fatal to the request, a failed
//! generation call always degrades to canned text, and a failed storage
//! write is surfaced while the enriched objects are still returned to the
//! caller in memory.

pub mod annotate;
pub mod catalog;
pub mod normalize;
pub mod overlap;
pub mod record;

pub use annotate::DetectedObject;
pub use normalize::{ImageSize, NormalizedBox, RawBox};
pub use record::{DetectionRecord, DetectionStats};

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::detect::{DetectionError, ObjectDetector};
use crate::generate::TextGenerator;
use crate::storage::{uploads, DetectionStore, PersistenceError};

/// Fatal scan failures surfaced to the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid image upload: {0}")]
    InvalidImage(String),
    #[error(transparent)]
    DetectionUnavailable(#[from] DetectionError),
}

/// Result of a full pipeline pass.
///
/// The enriched record is always present. `record.id` is set only when the
/// storage write succeeded; `persistence_error` carries the failure
/// otherwise, so a storage hiccup never loses the analysis.
#[derive(Debug)]
pub struct ScanOutcome {
    pub record: DetectionRecord,
    pub stats: DetectionStats,
    pub persistence_error: Option<PersistenceError>,
}

/// The enrichment pipeline bound to its external collaborators.
pub struct DetectionPipeline<'a> {
    detector: &'a dyn ObjectDetector,
    generator: Option<&'a dyn TextGenerator>,
    iou_threshold: f64,
    low_confidence_threshold: f64,
    confidence_floor: f64,
    priority_labels: Vec<String>,
    generation_timeout: Duration,
    generation_max_tokens: u32,
}

impl<'a> DetectionPipeline<'a> {
    pub fn new(
        config: &AppConfig,
        detector: &'a dyn ObjectDetector,
        generator: Option<&'a dyn TextGenerator>,
    ) -> Self {
        Self {
            detector,
            generator,
            iou_threshold: config.pipeline.iou_threshold,
            low_confidence_threshold: config.pipeline.low_confidence_threshold,
            confidence_floor: config.detector.confidence_floor,
            priority_labels: config.pipeline.priority_labels.clone(),
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
            generation_max_tokens: config.generation.max_tokens,
        }
    }

    /// Run the full pass over one uploaded image.
    pub fn process_image(
        &self,
        image_bytes: &[u8],
        image_url: &str,
        store: Option<&DetectionStore>,
    ) -> Result<ScanOutcome, PipelineError> {
        let (width, height) = uploads::probe_dimensions(image_bytes)
            .map_err(|err| PipelineError::InvalidImage(err.to_string()))?;
        let image = ImageSize { width, height };

        let raw = self.detector.detect(image_bytes)?;
        debug!("Detector returned {} raw boxes for {}", raw.len(), image_url);

        let raw = self.prepare_raw_boxes(raw);
        let normalized = normalize::normalize_boxes(raw, image);
        let resolved = overlap::resolve_overlaps(normalized, self.iou_threshold);
        let objects = annotate::enrich_all(resolved, self.low_confidence_threshold);

        let mut record = record::build_record(image_url, width, height, objects);
        let stats = record::compute_stats(&record.objects, &self.priority_labels);

        let mut persistence_error = None;
        if let Some(store) = store {
            match store.create(&record) {
                Ok(id) => {
                    record.id = Some(id);
                    info!(
                        "Stored detection record {} with {} objects",
                        id, stats.total_objects
                    );
                }
                Err(err) => {
                    warn!("Failed to persist detection record: {err}");
                    persistence_error = Some(err);
                }
            }
        }

        Ok(ScanOutcome {
            record,
            stats,
            persistence_error,
        })
    }

    /// Free-form technical analysis for one component label.
    ///
    /// Degrades to canned analysis text on any generation failure; this
    /// operation never fails.
    pub fn annotate_component(&self, label: &str, issue: Option<&str>) -> String {
        if let Some(generator) = self.generator {
            let prompt = annotate::analysis_prompt(label, issue);
            match generator.complete(&prompt, self.generation_max_tokens, self.generation_timeout)
            {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => warn!("Generation returned empty analysis for '{label}'"),
                Err(err) => warn!("Component analysis failed for '{label}': {err}"),
            }
        }

        annotate::canned_analysis(label).to_string()
    }

    /// Apply the detector confidence floor and fold model class names onto
    /// station categories before validation.
    fn prepare_raw_boxes(&self, raw: Vec<RawBox>) -> Vec<RawBox> {
        raw.into_iter()
            .filter(|raw_box| {
                if raw_box.confidence >= self.confidence_floor {
                    true
                } else {
                    debug!(
                        "Dropping '{}' below confidence floor ({:.2} < {:.2})",
                        raw_box.label, raw_box.confidence, self.confidence_floor
                    );
                    false
                }
            })
            .map(|mut raw_box| {
                if let Some(mapped) = catalog::canonical_label(&raw_box.label) {
                    if !mapped.eq_ignore_ascii_case(&raw_box.label) {
                        if raw_box.original_class.is_none() {
                            raw_box.original_class = Some(raw_box.label.clone());
                        }
                        raw_box.label = mapped.to_string();
                    }
                }
                raw_box
            })
            .collect()
    }
}
