//! Equipment catalog
//!
//! Immutable lookup tables mapping detection labels to display color and
//! category context, plus the synonym mapping that folds model class names
//! onto station categories. Loaded once at process start; never mutated.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One known equipment category.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub label: &'static str,
    pub context: &'static str,
    pub color: &'static str,
    pub reference_link: Option<&'static str>,
}

/// Known station equipment categories.
pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        label: "toolbox",
        context: "Maintenance equipment",
        color: "#ffc107",
        reference_link: Some("https://www.nasa.gov/international-space-station/space-station-maintenance"),
    },
    CatalogEntry {
        label: "oxygen tank",
        context: "Life support equipment",
        color: "#2196f3",
        reference_link: Some("https://www.nasa.gov/international-space-station/life-support-systems"),
    },
    CatalogEntry {
        label: "fire extinguisher",
        context: "Critical safety equipment",
        color: "#f44336",
        reference_link: Some("https://www.nasa.gov/international-space-station/emergency-equipment"),
    },
    CatalogEntry {
        label: "satellite",
        context: "Orbital communications hardware",
        color: "#3f51b5",
        reference_link: None,
    },
    CatalogEntry {
        label: "debris",
        context: "Untracked orbital object",
        color: "#795548",
        reference_link: None,
    },
    CatalogEntry {
        label: "station",
        context: "Primary station structure",
        color: "#607d8b",
        reference_link: None,
    },
    CatalogEntry {
        label: "rocket",
        context: "Propulsion hardware",
        color: "#ff5722",
        reference_link: None,
    },
    CatalogEntry {
        label: "telescope",
        context: "Observation instrument",
        color: "#673ab7",
        reference_link: None,
    },
    CatalogEntry {
        label: "astronaut",
        context: "Crew member on EVA",
        color: "#4caf50",
        reference_link: None,
    },
    CatalogEntry {
        label: "solar panel",
        context: "Power generation array",
        color: "#009688",
        reference_link: None,
    },
    CatalogEntry {
        label: "antenna",
        context: "Communications equipment",
        color: "#00bcd4",
        reference_link: None,
    },
];

/// Context text used for labels with no catalog entry.
pub const UNKNOWN_CONTEXT: &str = "Space station component";

/// Fallback colors for unknown labels, selected by label hash so the same
/// label always gets the same color within a run.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#9c27b0", "#9e9e9e", "#8bc34a", "#ff9800", "#03a9f4", "#e91e63",
];

/// Look up a known category by label, case-insensitive.
pub fn lookup(label: &str) -> Option<&'static CatalogEntry> {
    CATALOG
        .iter()
        .find(|entry| entry.label.eq_ignore_ascii_case(label))
}

/// Palette color for a label with no catalog entry.
pub fn fallback_color(label: &str) -> &'static str {
    let mut hasher = DefaultHasher::new();
    label.to_lowercase().hash(&mut hasher);
    DEFAULT_PALETTE[(hasher.finish() % DEFAULT_PALETTE.len() as u64) as usize]
}

/// Fold a model class name onto a station category.
///
/// Direct name matches win; otherwise synonym keywords decide. Returns
/// `None` when the class maps to no known category, in which case the
/// label passes through unchanged and gets the unknown-label treatment.
pub fn canonical_label(original_class: &str) -> Option<&'static str> {
    let lower = original_class.to_lowercase();

    for entry in CATALOG {
        if lower.contains(entry.label) {
            return Some(entry.label);
        }
    }

    const TOOLBOX_HINTS: &[&str] = &["tool", "box", "container", "kit", "bag"];
    const EXTINGUISHER_HINTS: &[&str] = &["fire", "extinguisher", "bottle", "cylinder"];
    const OXYGEN_HINTS: &[&str] = &["oxygen", "tank", "gas", "canister", "tube"];

    if TOOLBOX_HINTS.iter().any(|hint| lower.contains(hint)) {
        Some("toolbox")
    } else if EXTINGUISHER_HINTS.iter().any(|hint| lower.contains(hint)) {
        Some("fire extinguisher")
    } else if OXYGEN_HINTS.iter().any(|hint| lower.contains(hint)) {
        Some("oxygen tank")
    } else {
        None
    }
}
