//! Detection record assembly
//!
//! Builds the persistable record from annotated objects and computes the
//! aggregate statistics consumed at the API boundary. The record id is
//! assigned only when the storage collaborator accepts the write.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::annotate::DetectedObject;

/// Finalized detection record. `objects` keeps detection rank order and is
/// never mutated after creation; an empty list is a valid scan result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    /// Storage-assigned id, absent until the record is persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub image_url: String,
    pub image_width: u32,
    pub image_height: u32,
    pub objects: Vec<DetectedObject>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over a record's objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    pub total_objects: usize,
    pub category_counts: BTreeMap<String, usize>,
    pub average_confidence: f64,
    pub priority_objects_detected: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highest_confidence_object: Option<DetectedObject>,
}

/// Assemble a record from annotated objects and the image reference.
pub fn build_record(
    image_url: &str,
    image_width: u32,
    image_height: u32,
    objects: Vec<DetectedObject>,
) -> DetectionRecord {
    DetectionRecord {
        id: None,
        image_url: image_url.to_string(),
        image_width,
        image_height,
        objects,
        created_at: Utc::now(),
    }
}

/// Compute aggregate statistics. Category count values always sum to
/// `total_objects`; the highest-confidence tie goes to the earlier object.
pub fn compute_stats(objects: &[DetectedObject], priority_labels: &[String]) -> DetectionStats {
    let total_objects = objects.len();

    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
    for object in objects {
        *category_counts.entry(object.label.clone()).or_insert(0) += 1;
    }

    let average_confidence = if objects.is_empty() {
        0.0
    } else {
        objects.iter().map(|o| o.confidence).sum::<f64>() / total_objects as f64
    };

    let priority_objects_detected = objects
        .iter()
        .filter(|object| {
            priority_labels
                .iter()
                .any(|label| label.eq_ignore_ascii_case(&object.label))
        })
        .count();

    let highest_confidence_object = objects
        .iter()
        .reduce(|best, candidate| {
            if candidate.confidence > best.confidence {
                candidate
            } else {
                best
            }
        })
        .cloned();

    DetectionStats {
        total_objects,
        category_counts,
        average_confidence,
        priority_objects_detected,
        highest_confidence_object,
    }
}
