//! Context annotation
//!
//! Enriches surviving boxes with category context, display color and issue
//! flags, and provides the free-form analysis text used by the component
//! annotation endpoint. Analysis degrades to canned text whenever the
//! text-generation collaborator is unavailable, so it never fails outright.

use serde::{Deserialize, Serialize};

use super::catalog;
use super::normalize::NormalizedBox;

/// Detections below this confidence get a verification issue flag.
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Fully enriched detection. Immutable once emitted into a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub id: String,
    pub label: String,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_class: Option<String>,
}

/// Issue text for a detection below the confidence threshold.
pub fn low_confidence_issue(confidence: f64) -> String {
    format!(
        "Low confidence detection ({}%). Verification recommended.",
        (confidence * 100.0).round() as i64
    )
}

/// Enrich one normalized box.
///
/// A sub-threshold confidence overrides any issue text supplied upstream.
pub fn enrich(
    normalized: NormalizedBox,
    upstream_issue: Option<String>,
    low_confidence_threshold: f64,
) -> DetectedObject {
    let (context, color, reference_link) = match catalog::lookup(&normalized.label) {
        Some(entry) => (
            entry.context.to_string(),
            entry.color.to_string(),
            entry.reference_link.map(str::to_string),
        ),
        None => (
            catalog::UNKNOWN_CONTEXT.to_string(),
            catalog::fallback_color(&normalized.label).to_string(),
            None,
        ),
    };

    let issue = if normalized.confidence < low_confidence_threshold {
        Some(low_confidence_issue(normalized.confidence))
    } else {
        upstream_issue
    };

    DetectedObject {
        id: normalized.id,
        label: normalized.label,
        confidence: normalized.confidence,
        x: normalized.x,
        y: normalized.y,
        width: normalized.width,
        height: normalized.height,
        color,
        context,
        issue,
        reference_link,
        original_class: normalized.original_class,
    }
}

/// Enrich a batch of boxes, preserving order.
pub fn enrich_all(
    boxes: Vec<NormalizedBox>,
    low_confidence_threshold: f64,
) -> Vec<DetectedObject> {
    boxes
        .into_iter()
        .map(|normalized| enrich(normalized, None, low_confidence_threshold))
        .collect()
}

/// Prompt template for the free-form analysis request.
pub fn analysis_prompt(label: &str, issue: Option<&str>) -> String {
    match issue {
        Some(issue) => format!(
            "You are a space station operations assistant. Provide a short \
             technical analysis of the detected component '{label}'. \
             A reported issue needs attention: {issue}. \
             Cover function, inspection points and recommended action."
        ),
        None => format!(
            "You are a space station operations assistant. Provide a short \
             technical analysis of the detected component '{label}'. \
             Cover function, inspection points and recommended action."
        ),
    }
}

/// Deterministic analysis text keyed by category substring, used when the
/// text-generation service is unavailable.
pub fn canned_analysis(label: &str) -> &'static str {
    let lower = label.to_lowercase();

    if lower.contains("fire") || lower.contains("extinguisher") {
        "Critical safety equipment. Check pressure gauge and ensure easy access."
    } else if lower.contains("oxygen") || lower.contains("tank") {
        "Life support equipment. Verify pressure levels and connection integrity."
    } else if lower.contains("tool") || lower.contains("box") {
        "Equipment storage. Ensure proper organization and inventory completion."
    } else {
        "Space station component. Monitor for proper functionality."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(label: &str, confidence: f64) -> NormalizedBox {
        NormalizedBox {
            id: "box-1".to_string(),
            label: label.to_string(),
            confidence,
            x: 0.1,
            y: 0.1,
            width: 0.2,
            height: 0.2,
            original_class: None,
        }
    }

    #[test]
    fn test_known_label_gets_catalog_context_and_color() {
        let object = enrich(normalized("oxygen tank", 0.9), None, DEFAULT_LOW_CONFIDENCE_THRESHOLD);

        assert_eq!(object.context, "Life support equipment");
        assert_eq!(object.color, "#2196f3");
        assert!(object.issue.is_none());
        assert!(object.reference_link.is_some());
    }

    #[test]
    fn test_unknown_label_gets_fallback_context_and_stable_color() {
        let first = enrich(normalized("mystery module", 0.9), None, DEFAULT_LOW_CONFIDENCE_THRESHOLD);
        let second = enrich(normalized("mystery module", 0.9), None, DEFAULT_LOW_CONFIDENCE_THRESHOLD);

        assert_eq!(first.context, "Space station component");
        assert_eq!(first.color, second.color);
    }

    #[test]
    fn test_low_confidence_sets_issue_with_rounded_percentage() {
        let object = enrich(normalized("oxygen tank", 0.3), None, DEFAULT_LOW_CONFIDENCE_THRESHOLD);

        let issue = object.issue.unwrap();
        assert!(issue.contains("30%"), "unexpected issue text: {issue}");
        assert!(issue.contains("Verification recommended"));
    }

    #[test]
    fn test_low_confidence_overrides_upstream_issue() {
        let object = enrich(
            normalized("toolbox", 0.42),
            Some("latch damaged".to_string()),
            DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        );

        assert_eq!(object.issue.as_deref(), Some("Low confidence detection (42%). Verification recommended."));
    }

    #[test]
    fn test_confident_detection_keeps_upstream_issue() {
        let object = enrich(
            normalized("toolbox", 0.95),
            Some("latch damaged".to_string()),
            DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        );

        assert_eq!(object.issue.as_deref(), Some("latch damaged"));
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let object = enrich(normalized("toolbox", 0.6), None, DEFAULT_LOW_CONFIDENCE_THRESHOLD);
        assert!(object.issue.is_none());
    }

    #[test]
    fn test_canned_analysis_by_category_substring() {
        assert!(canned_analysis("fire extinguisher").contains("Critical safety equipment"));
        assert!(canned_analysis("oxygen tank").contains("Life support equipment"));
        assert!(canned_analysis("toolbox").contains("Equipment storage"));
        assert!(canned_analysis("satellite").contains("Space station component"));
    }

    #[test]
    fn test_analysis_prompt_mentions_issue() {
        let prompt = analysis_prompt("fire extinguisher", Some("pressure low"));
        assert!(prompt.contains("fire extinguisher"));
        assert!(prompt.contains("pressure low"));
    }
}
