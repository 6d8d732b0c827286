//! Equipment Photo Pro - Enhancement Prompt
//!
//! Turns the scene choices a dealer picks in the upload form into the
//! text prompt sent to the image model.

use serde::{Deserialize, Serialize};

/// Fixed prompt served at `GET /api/prompt`
pub const DEFAULT_PROMPT: &str = "Maintain the original perspective and zoom of the equipment. \
Place the main subject (e.g., 'a red tractor', 'a combine harvester', 'a green ATV') on a realistic, \
textured cement lot. In the background, feature a truly natural, subtly rolling landscape of green \
fields with authentic variations in foliage, blending seamlessly with an expansive sky displaying \
very subtle, diffused clouds or a light, natural haze. Ensure realistic, balanced lighting enhances \
the subject without looking artificial. Remove any unnecessary objects to maintain a clean, \
professional aesthetic. Crucially, do not alter or distort any existing text, numbers, or logos on \
the equipment.";

pub const PROMPT_DESCRIPTION: &str = "Professional equipment photo enhancement prompt";

const SUBJECT_CLAUSE: &str = "CRITICAL: Do not alter the subject of the image at all. Keep the \
equipment exactly as it appears in the original - preserve all details, colors, text, numbers, \
logos, and physical characteristics. Only change the background, lighting, and environmental \
elements. The equipment itself must remain completely unchanged.";

// ═══════════════════════════════════════════════════════════════════════════════
// SCENE OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

const PAVEMENTS: &[(&str, &str)] = &[
    ("cement-lot", "realistic, textured cement lot"),
    ("asphalt-lot", "realistic, textured asphalt lot"),
    (
        "wet-asphalt",
        "realistic, wet asphalt lot that appears to have recently rained, with natural reflections and darker tones",
    ),
    ("gravel-lot", "realistic, textured gravel lot"),
    ("concrete-lot", "realistic, textured concrete lot"),
];

const SKIES: &[(&str, &str)] = &[
    ("subtle-clouds", "very subtle, diffused clouds or a light, natural haze"),
    ("clear-sky", "clear, bright sky with minimal clouds"),
    ("dramatic-clouds", "dramatic, well-defined clouds with natural variations"),
    (
        "sunset-sky",
        "beautiful sunset sky with warm colors and natural cloud formations",
    ),
];

const LANDSCAPES: &[(&str, &str)] = &[
    (
        "rolling-fields",
        "truly natural, subtly rolling landscape of green fields with authentic variations in foliage",
    ),
    (
        "flat-fields",
        "natural, flat landscape of green fields with authentic variations in foliage",
    ),
    (
        "grass",
        "natural grass landscape with authentic variations in texture and color",
    ),
    (
        "hillside",
        "natural hillside landscape with authentic variations in terrain and foliage",
    ),
    (
        "forest-edge",
        "natural forest edge landscape with authentic variations in trees and foliage",
    ),
];

/// Look up `key`; unknown keys get the first (default) entry
fn describe(table: &[(&str, &'static str)], key: &str) -> &'static str {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .or_else(|| table.first())
        .map(|(_, d)| *d)
        .unwrap_or_default()
}

/// Keys accepted for each scene option
pub fn option_keys() -> (Vec<&'static str>, Vec<&'static str>, Vec<&'static str>) {
    let keys = |t: &[(&'static str, &'static str)]| -> Vec<&'static str> {
        t.iter().map(|(k, _)| *k).collect()
    };
    (keys(SKIES), keys(PAVEMENTS), keys(LANDSCAPES))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPT SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Scene choices sent as the `promptSettings` form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptSettings {
    pub sky_type: String,
    pub pavement_type: String,
    pub landscape_type: String,
    pub equipment_type: String,
    pub custom_prompt: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            sky_type: "subtle-clouds".to_string(),
            pavement_type: "cement-lot".to_string(),
            landscape_type: "rolling-fields".to_string(),
            equipment_type: "tractor".to_string(),
            custom_prompt: String::new(),
        }
    }
}

impl PromptSettings {
    /// Render the prompt for these settings
    pub fn build_prompt(&self) -> String {
        let equipment = match self.equipment_type.trim() {
            "" => "tractor",
            other => other,
        };

        let mut prompt = format!(
            "Maintain the original perspective and zoom of the equipment. Place the main subject \
             (e.g., 'a {equipment}', 'a combine harvester', 'a green ATV') on a {pavement}. In the \
             background, feature a {landscape}, blending seamlessly with an expansive sky displaying \
             {sky}. Ensure realistic, balanced lighting enhances the subject without looking \
             artificial. Remove any unnecessary objects to maintain a clean, professional \
             aesthetic.\n\n{SUBJECT_CLAUSE}",
            pavement = describe(PAVEMENTS, &self.pavement_type),
            landscape = describe(LANDSCAPES, &self.landscape_type),
            sky = describe(SKIES, &self.sky_type),
        );

        let custom = self.custom_prompt.trim();
        if !custom.is_empty() {
            prompt.push_str(" Additional requirements: ");
            prompt.push_str(custom);
        }

        prompt
    }
}

/// Prompt for a request: a non-blank client prompt wins over the settings
pub fn resolve_prompt(settings: &PromptSettings, dynamic_prompt: Option<&str>) -> String {
    match dynamic_prompt.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => settings.build_prompt(),
    }
}
