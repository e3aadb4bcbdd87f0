//! Raw detection normalization
//!
//! Validates raw model output and converts it into canonical boxes with
//! freshly assigned opaque ids. Malformed boxes are dropped individually
//! with a logged warning; a bad box never fails the whole batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Coordinates within this distance of [0, 1] are clamped back into range.
/// Anything further out is treated as a malformed box and dropped.
pub const CLAMP_TOLERANCE: f64 = 1e-4;

/// Raw bounding box as produced by the external detector service.
///
/// Coordinates are image fractions in [0, 1] with the origin at the top-left
/// corner of the image. Field names follow the detector's JSON contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBox {
    pub label: String,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Class name reported by the underlying model before category mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_class: Option<String>,
}

/// Validated box with clamped geometry and an assigned opaque id.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBox {
    pub id: String,
    pub label: String,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub original_class: Option<String>,
}

/// Source image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Why a raw box was rejected during normalization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoxRejection {
    #[error("label is empty")]
    EmptyLabel,
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("{field} is not a finite number")]
    NonFiniteGeometry { field: &'static str },
    #[error("degenerate box: {field} = {value}")]
    Degenerate { field: &'static str, value: f64 },
    #[error("{field} = {value} outside the image beyond tolerance")]
    OutOfBounds { field: &'static str, value: f64 },
}

/// Validate a batch of raw boxes against the source image.
///
/// Survivors keep their input order and get fresh ids. Rejected boxes are
/// logged with the offending field and skipped.
pub fn normalize_boxes(raw: Vec<RawBox>, image: ImageSize) -> Vec<NormalizedBox> {
    let input_count = raw.len();
    let mut normalized = Vec::with_capacity(input_count);

    for (index, raw_box) in raw.into_iter().enumerate() {
        match validate(&raw_box) {
            Ok((x, y, width, height)) => normalized.push(NormalizedBox {
                id: Uuid::new_v4().to_string(),
                label: raw_box.label,
                confidence: raw_box.confidence,
                x,
                y,
                width,
                height,
                original_class: raw_box.original_class,
            }),
            Err(rejection) => {
                warn!(
                    "Dropping raw box {} ('{}', {}x{} image): {}",
                    index, raw_box.label, image.width, image.height, rejection
                );
            }
        }
    }

    debug!(
        "Normalized {}/{} raw boxes for {}x{} image",
        normalized.len(),
        input_count,
        image.width,
        image.height
    );

    normalized
}

/// Validate one raw box, returning clamped (x, y, width, height).
fn validate(raw: &RawBox) -> Result<(f64, f64, f64, f64), BoxRejection> {
    if raw.label.trim().is_empty() {
        return Err(BoxRejection::EmptyLabel);
    }

    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(BoxRejection::ConfidenceOutOfRange(raw.confidence));
    }

    for (field, value) in [
        ("x", raw.x),
        ("y", raw.y),
        ("width", raw.width),
        ("height", raw.height),
    ] {
        if !value.is_finite() {
            return Err(BoxRejection::NonFiniteGeometry { field });
        }
    }

    if raw.width <= 0.0 {
        return Err(BoxRejection::Degenerate {
            field: "width",
            value: raw.width,
        });
    }
    if raw.height <= 0.0 {
        return Err(BoxRejection::Degenerate {
            field: "height",
            value: raw.height,
        });
    }

    let x = clamp_unit("x", raw.x)?;
    let y = clamp_unit("y", raw.y)?;
    let width = clamp_extent("x+width", x, raw.width)?;
    let height = clamp_extent("y+height", y, raw.height)?;

    Ok((x, y, width, height))
}

/// Clamp a coordinate into [0, 1], rejecting values beyond tolerance.
fn clamp_unit(field: &'static str, value: f64) -> Result<f64, BoxRejection> {
    if value < -CLAMP_TOLERANCE || value > 1.0 + CLAMP_TOLERANCE {
        return Err(BoxRejection::OutOfBounds { field, value });
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Clamp an extent so origin + extent stays within the unit interval.
fn clamp_extent(field: &'static str, origin: f64, extent: f64) -> Result<f64, BoxRejection> {
    let end = origin + extent;
    if end > 1.0 + CLAMP_TOLERANCE {
        return Err(BoxRejection::OutOfBounds { field, value: end });
    }
    Ok(extent.min(1.0 - origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: ImageSize = ImageSize {
        width: 640,
        height: 480,
    };

    fn raw(label: &str, confidence: f64, x: f64, y: f64, width: f64, height: f64) -> RawBox {
        RawBox {
            label: label.to_string(),
            confidence,
            x,
            y,
            width,
            height,
            original_class: None,
        }
    }

    #[test]
    fn test_valid_boxes_pass_through_in_order() {
        let boxes = vec![
            raw("toolbox", 0.9, 0.1, 0.1, 0.2, 0.2),
            raw("oxygen tank", 0.7, 0.5, 0.5, 0.3, 0.3),
        ];

        let normalized = normalize_boxes(boxes, IMAGE);

        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].label, "toolbox");
        assert_eq!(normalized[1].label, "oxygen tank");
        assert_ne!(normalized[0].id, normalized[1].id);
        assert!(!normalized[0].id.is_empty());
    }

    #[test]
    fn test_confidence_out_of_range_is_dropped() {
        let boxes = vec![
            raw("toolbox", 1.2, 0.1, 0.1, 0.2, 0.2),
            raw("toolbox", -0.1, 0.1, 0.1, 0.2, 0.2),
            raw("toolbox", 0.5, 0.1, 0.1, 0.2, 0.2),
        ];

        let normalized = normalize_boxes(boxes, IMAGE);

        assert_eq!(normalized.len(), 1);
        assert!((normalized[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_nan_geometry_is_dropped() {
        let boxes = vec![raw("toolbox", 0.9, f64::NAN, 0.1, 0.2, 0.2)];
        assert!(normalize_boxes(boxes, IMAGE).is_empty());
    }

    #[test]
    fn test_degenerate_box_is_dropped() {
        let boxes = vec![
            raw("toolbox", 0.9, 0.1, 0.1, 0.0, 0.2),
            raw("toolbox", 0.9, 0.1, 0.1, 0.2, -0.3),
        ];
        assert!(normalize_boxes(boxes, IMAGE).is_empty());
    }

    #[test]
    fn test_marginal_coordinates_are_clamped() {
        let boxes = vec![raw("toolbox", 0.9, -5e-5, 0.1, 0.2, 0.2)];

        let normalized = normalize_boxes(boxes, IMAGE);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].x, 0.0);
    }

    #[test]
    fn test_marginal_overflow_is_clamped() {
        // 0.9 + 0.10005 = 1.00005, within the 1e-4 tolerance
        let boxes = vec![raw("toolbox", 0.9, 0.9, 0.1, 0.10005, 0.2)];

        let normalized = normalize_boxes(boxes, IMAGE);

        assert_eq!(normalized.len(), 1);
        assert!((normalized[0].x + normalized[0].width - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coordinates_beyond_tolerance_are_dropped() {
        let boxes = vec![
            raw("toolbox", 0.9, -0.01, 0.1, 0.2, 0.2),
            raw("toolbox", 0.9, 0.9, 0.1, 0.15, 0.2),
        ];
        assert!(normalize_boxes(boxes, IMAGE).is_empty());
    }

    #[test]
    fn test_empty_label_is_dropped() {
        let boxes = vec![raw("  ", 0.9, 0.1, 0.1, 0.2, 0.2)];
        assert!(normalize_boxes(boxes, IMAGE).is_empty());
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(normalize_boxes(vec![], IMAGE).is_empty());
    }

    #[test]
    fn test_raw_box_json_contract() {
        let json = r#"{
            "label": "fire extinguisher",
            "confidence": 0.82,
            "x": 0.1,
            "y": 0.2,
            "width": 0.3,
            "height": 0.4,
            "originalClass": "bottle"
        }"#;

        let parsed: RawBox = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.label, "fire extinguisher");
        assert_eq!(parsed.original_class.as_deref(), Some("bottle"));
    }
}
