//! Overlap resolution
//!
//! Collapses multiple raw detections that represent the same physical
//! object. Boxes with the same label (case-insensitive) and an IoU at or
//! above the threshold are duplicates: only the higher-confidence box
//! survives. Cross-label overlaps are never merged, since they are
//! different claims about the same region.
//!
//! Pairs are processed in descending order of combined confidence so that
//! chains of overlaps resolve deterministically without forced merging:
//! if A overlaps B and B overlaps C but A does not overlap C, B is removed
//! and both A and C survive.

use std::cmp::Ordering;

use tracing::debug;

use super::normalize::NormalizedBox;

pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Intersection-over-Union of two boxes in fractional coordinates.
pub fn iou(a: &NormalizedBox, b: &NormalizedBox) -> f64 {
    let left = a.x.max(b.x);
    let top = a.y.max(b.y);
    let right = (a.x + a.width).min(b.x + b.width);
    let bottom = (a.y + a.height).min(b.y + b.height);

    if right <= left || bottom <= top {
        return 0.0;
    }

    let intersection = (right - left) * (bottom - top);
    let union = a.width * a.height + b.width * b.height - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Remove duplicate detections, keeping survivors in input order.
///
/// Pure and deterministic: identical input always yields identical output,
/// and running the resolver on its own output is a no-op.
pub fn resolve_overlaps(boxes: Vec<NormalizedBox>, iou_threshold: f64) -> Vec<NormalizedBox> {
    if boxes.len() < 2 {
        return boxes;
    }

    // Candidate pairs: same label, IoU at or above threshold.
    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            if !boxes[i].label.eq_ignore_ascii_case(&boxes[j].label) {
                continue;
            }
            if iou(&boxes[i], &boxes[j]) >= iou_threshold {
                pairs.push((i, j, boxes[i].confidence + boxes[j].confidence));
            }
        }
    }

    // Descending combined confidence; index order breaks exact ties.
    pairs.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    let mut removed = vec![false; boxes.len()];
    for (i, j, _) in pairs {
        if removed[i] || removed[j] {
            continue;
        }
        // Equal confidence keeps the box that appeared first in the input.
        let loser = if boxes[j].confidence > boxes[i].confidence {
            i
        } else {
            j
        };
        removed[loser] = true;
        debug!(
            "Suppressed duplicate '{}' (confidence {:.2})",
            boxes[loser].label, boxes[loser].confidence
        );
    }

    boxes
        .into_iter()
        .zip(removed)
        .filter_map(|(b, dead)| (!dead).then_some(b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(label: &str, confidence: f64, x: f64, y: f64, width: f64, height: f64) -> NormalizedBox {
        NormalizedBox {
            id: format!("{label}-{confidence}-{x}"),
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
    fn test_iou_identical_boxes() {
        let a = boxed("toolbox", 0.9, 0.1, 0.1, 0.2, 0.2);
        let b = boxed("toolbox", 0.4, 0.1, 0.1, 0.2, 0.2);
        assert!((iou(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = boxed("toolbox", 0.9, 0.0, 0.0, 0.2, 0.2);
        let b = boxed("toolbox", 0.4, 0.5, 0.5, 0.2, 0.2);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_high_iou_same_label_keeps_higher_confidence() {
        let survivors = resolve_overlaps(
            vec![
                boxed("toolbox", 0.4, 0.02, 0.02, 0.2, 0.2),
                boxed("toolbox", 0.9, 0.0, 0.0, 0.2, 0.2),
            ],
            DEFAULT_IOU_THRESHOLD,
        );

        assert_eq!(survivors.len(), 1);
        assert!((survivors[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_low_iou_same_label_both_survive() {
        let survivors = resolve_overlaps(
            vec![
                boxed("toolbox", 0.9, 0.0, 0.0, 0.2, 0.2),
                boxed("toolbox", 0.8, 0.15, 0.15, 0.2, 0.2),
            ],
            DEFAULT_IOU_THRESHOLD,
        );

        assert_eq!(survivors.len(), 2);
    }

    #[test]
    fn test_cross_label_full_overlap_never_merges() {
        let survivors = resolve_overlaps(
            vec![
                boxed("toolbox", 0.9, 0.0, 0.0, 0.2, 0.2),
                boxed("debris", 0.4, 0.0, 0.0, 0.2, 0.2),
            ],
            DEFAULT_IOU_THRESHOLD,
        );

        assert_eq!(survivors.len(), 2);
    }

    #[test]
    fn test_label_comparison_is_case_insensitive() {
        let survivors = resolve_overlaps(
            vec![
                boxed("Toolbox", 0.9, 0.0, 0.0, 0.2, 0.2),
                boxed("toolbox", 0.4, 0.0, 0.0, 0.2, 0.2),
            ],
            DEFAULT_IOU_THRESHOLD,
        );

        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].label, "Toolbox");
    }

    #[test]
    fn test_equal_confidence_keeps_first_in_input_order() {
        let survivors = resolve_overlaps(
            vec![
                boxed("toolbox", 0.7, 0.0, 0.0, 0.2, 0.2),
                boxed("toolbox", 0.7, 0.01, 0.01, 0.2, 0.2),
            ],
            DEFAULT_IOU_THRESHOLD,
        );

        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].x, 0.0);
    }

    #[test]
    fn test_transitive_chain_removes_only_middle_box() {
        // A overlaps B, B overlaps C, A does not overlap C.
        let a = boxed("toolbox", 0.9, 0.0, 0.0, 0.4, 0.2);
        let b = boxed("toolbox", 0.6, 0.12, 0.0, 0.4, 0.2);
        let c = boxed("toolbox", 0.8, 0.24, 0.0, 0.4, 0.2);

        assert!(iou(&a, &b) >= DEFAULT_IOU_THRESHOLD);
        assert!(iou(&b, &c) >= DEFAULT_IOU_THRESHOLD);
        assert!(iou(&a, &c) < DEFAULT_IOU_THRESHOLD);

        let survivors = resolve_overlaps(vec![a, b, c], DEFAULT_IOU_THRESHOLD);

        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].x, 0.0);
        assert_eq!(survivors[1].x, 0.24);
    }

    #[test]
    fn test_survivors_keep_input_order() {
        let survivors = resolve_overlaps(
            vec![
                boxed("debris", 0.5, 0.6, 0.6, 0.2, 0.2),
                boxed("toolbox", 0.4, 0.0, 0.0, 0.2, 0.2),
                boxed("toolbox", 0.9, 0.02, 0.02, 0.2, 0.2),
            ],
            DEFAULT_IOU_THRESHOLD,
        );

        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].label, "debris");
        assert_eq!(survivors[1].label, "toolbox");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let input = vec![
            boxed("toolbox", 0.9, 0.0, 0.0, 0.2, 0.2),
            boxed("toolbox", 0.4, 0.02, 0.02, 0.2, 0.2),
            boxed("oxygen tank", 0.7, 0.5, 0.5, 0.2, 0.2),
            boxed("oxygen tank", 0.6, 0.51, 0.5, 0.2, 0.2),
        ];

        let once = resolve_overlaps(input, DEFAULT_IOU_THRESHOLD);
        let twice = resolve_overlaps(once.clone(), DEFAULT_IOU_THRESHOLD);

        assert_eq!(once, twice);
    }
}
