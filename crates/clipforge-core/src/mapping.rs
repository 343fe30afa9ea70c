//! Layer mapping resolution.
//!
//! Translates semantic field names into the literal layer names of a
//! template. Resolution per template:
//!
//! 1. a predefined operator-maintained table, returned whole;
//! 2. a mapping persisted from an earlier run, kept field by field;
//! 3. pattern inference over the layers not yet mapped, followed by a text
//!    fallback pass for free-form layer names.
//!
//! The tables are plain data injected at construction so that deployments
//! can override them.

use std::collections::{BTreeMap, HashSet};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::template::{LayerInfo, LayerMapping};
use crate::TemplateId;

/// Text slots the fallback pass may fill.
const TEXT_SLOTS: [&str; 4] = ["text1", "text2", "text3", "text4"];

/// Extensions that mark a layer as footage rather than text.
const FILE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".tif", ".tiff", ".psd", ".ai", ".mp4",
    ".mov", ".webm", ".avi", ".mp3", ".wav", ".aep", ".json",
];

/// Name prefixes of layers that are never user text.
const SYSTEM_LAYER_PREFIXES: &[&str] = &[
    "background", "bg", "shape", "null", "camera", "adjustment", "solid", "light", "audio",
    "control", "matte", "precomp", "comp",
];

/// Ordered patterns for one semantic field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPatterns {
    /// Semantic field name.
    pub field: String,
    /// Case-insensitive regular expressions, tried in order.
    pub patterns: Vec<String>,
}

impl FieldPatterns {
    fn new(field: &str, patterns: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            patterns: patterns.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Mapping data: predefined per-template tables and inference patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingTables {
    /// Operator-maintained mappings for templates with ambiguous layer names.
    #[serde(default)]
    pub predefined: BTreeMap<TemplateId, LayerMapping>,
    /// Inference patterns, in field priority order.
    pub patterns: Vec<FieldPatterns>,
}

impl MappingTables {
    /// The tables shipped with the service.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            predefined: builtin_predefined(),
            patterns: builtin_patterns(),
        }
    }

    /// Load tables from JSON. A missing `patterns` key is an error; a missing
    /// `predefined` key means no predefined templates.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Configuration` if the JSON does not parse.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RenderError::Configuration(format!("invalid layer mapping tables: {e}")))
    }
}

fn mapping(pairs: &[(&str, &str)]) -> LayerMapping {
    pairs
        .iter()
        .map(|(field, layer)| ((*field).to_string(), (*layer).to_string()))
        .collect()
}

fn builtin_predefined() -> BTreeMap<TemplateId, LayerMapping> {
    let mut tables = BTreeMap::new();
    let (Ok(first), Ok(second)) = (TemplateId::new(1), TemplateId::new(2)) else {
        return tables;
    };
    // Template 1 names its text layers in reverse reading order.
    tables.insert(
        first,
        mapping(&[
            ("text1", "txt_2"),
            ("text2", "txt_1"),
            ("image1", "img_2.png"),
            ("image2", "img_1.png"),
            ("background", "background.png"),
        ]),
    );
    tables.insert(
        second,
        mapping(&[
            ("text1", "Title"),
            ("text2", "Subtitle"),
            ("image1", "logo.png"),
            ("background", "bg_image.jpg"),
        ]),
    );
    tables
}

fn builtin_patterns() -> Vec<FieldPatterns> {
    const IMG: &str = r"(\.(png|jpe?g|gif|svg|webp))?";
    const VID: &str = r"(\.(mp4|mov|webm))?";

    let mut patterns = vec![
        FieldPatterns::new("text1", &[r"^txt[_ -]?1$", r"^text[_ -]?1$", r"^headline$", r"^title$"]),
        FieldPatterns::new("text2", &[r"^txt[_ -]?2$", r"^text[_ -]?2$", r"^sub[_ -]?headline$", r"^subtitle$"]),
        FieldPatterns::new("text3", &[r"^txt[_ -]?3$", r"^text[_ -]?3$", r"^description$", r"^body$"]),
        FieldPatterns::new("text4", &[r"^txt[_ -]?4$", r"^text[_ -]?4$", r"^cta$", r"^call[_ -]?to[_ -]?action$"]),
    ];

    for n in 1..=4 {
        let mut image = vec![
            format!(r"^img[_ -]?{n}{IMG}$"),
            format!(r"^image[_ -]?{n}{IMG}$"),
        ];
        if n == 1 {
            image.push(format!(r"^logo{IMG}$"));
        }
        patterns.push(FieldPatterns {
            field: format!("image{n}"),
            patterns: image,
        });
    }
    for n in 1..=4 {
        patterns.push(FieldPatterns {
            field: format!("icon{n}"),
            patterns: vec![format!(r"^icon[_ -]?{n}{IMG}$"), format!(r"^ico[_ -]?{n}{IMG}$")],
        });
    }
    for n in 1..=2 {
        patterns.push(FieldPatterns {
            field: format!("video{n}"),
            patterns: vec![format!(r"^vid(eo)?[_ -]?{n}{VID}$")],
        });
    }

    patterns.push(FieldPatterns {
        field: "background".into(),
        patterns: vec![
            format!(r"^background{IMG}$"),
            format!(r"^bg{IMG}$"),
            format!(r"^bg[_ -]?image{IMG}$"),
        ],
    });
    patterns.push(FieldPatterns {
        field: "productImage".into(),
        patterns: vec![format!(r"^product([_ -]?image)?{IMG}$")],
    });
    patterns.push(FieldPatterns {
        field: "image".into(),
        patterns: vec![format!(r"^image{IMG}$"), format!(r"^img{IMG}$")],
    });

    patterns
}

struct CompiledField {
    field: String,
    patterns: Vec<Regex>,
}

/// Resolves semantic field names to template layer names.
pub struct LayerMappingResolver {
    predefined: BTreeMap<TemplateId, LayerMapping>,
    fields: Vec<CompiledField>,
}

impl std::fmt::Debug for LayerMappingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerMappingResolver")
            .field("predefined_templates", &self.predefined.len())
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl LayerMappingResolver {
    /// Compile the pattern tables.
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Configuration` if a pattern is not a valid regex.
    pub fn new(tables: MappingTables) -> Result<Self> {
        let fields = tables
            .patterns
            .into_iter()
            .map(|entry| {
                let patterns = entry
                    .patterns
                    .iter()
                    .map(|p| {
                        RegexBuilder::new(p)
                            .case_insensitive(true)
                            .build()
                            .map_err(|e| {
                                RenderError::Configuration(format!(
                                    "invalid pattern `{p}` for field {}: {e}",
                                    entry.field
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledField {
                    field: entry.field,
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            predefined: tables.predefined,
            fields,
        })
    }

    /// The predefined table for a template, if any.
    #[must_use]
    pub fn predefined(&self, template_id: TemplateId) -> Option<&LayerMapping> {
        self.predefined.get(&template_id)
    }

    /// Resolve the mapping used for a render.
    ///
    /// A predefined table is returned whole. Otherwise fields from the
    /// persisted mapping are kept and inference fills the rest.
    #[must_use]
    pub fn resolve(
        &self,
        template_id: TemplateId,
        layers: &[LayerInfo],
        persisted: Option<&LayerMapping>,
    ) -> LayerMapping {
        if let Some(table) = self.predefined(template_id) {
            return table.clone();
        }

        let seed = persisted.cloned().unwrap_or_default();
        let resolved = self.infer_into(seed, layers);
        log_unmapped(template_id, layers, &resolved);
        resolved
    }

    /// Mapping to persist after a fresh upload: predefined or inferred.
    #[must_use]
    pub fn generate(&self, template_id: TemplateId, layers: &[LayerInfo]) -> LayerMapping {
        if let Some(table) = self.predefined(template_id) {
            return table.clone();
        }

        let inferred = self.infer(layers);
        log_unmapped(template_id, layers, &inferred);
        inferred
    }

    /// Pure pattern inference.
    #[must_use]
    pub fn infer(&self, layers: &[LayerInfo]) -> LayerMapping {
        self.infer_into(LayerMapping::new(), layers)
    }

    fn infer_into(&self, mut mapping: LayerMapping, layers: &[LayerInfo]) -> LayerMapping {
        let names = distinct_names(layers);
        let mut used: HashSet<String> = mapping.values().cloned().collect();

        for entry in &self.fields {
            if mapping.contains_key(&entry.field) {
                continue;
            }
            let found = entry.patterns.iter().find_map(|pattern| {
                names
                    .iter()
                    .copied()
                    .find(|name| !used.contains(*name) && pattern.is_match(name))
            });
            if let Some(name) = found {
                used.insert(name.to_string());
                mapping.insert(entry.field.clone(), name.to_string());
            }
        }

        let mut candidates: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| !used.contains(*name) && is_text_candidate(name))
            .collect();
        // Stable sort: names without a number keep their order after numbered ones.
        candidates.sort_by_key(|name| numeric_suffix(name).unwrap_or(u64::MAX));

        let free_slots: Vec<&str> = TEXT_SLOTS
            .iter()
            .copied()
            .filter(|slot| !mapping.contains_key(*slot))
            .collect();
        for (slot, name) in free_slots.into_iter().zip(candidates) {
            mapping.insert(slot.to_string(), name.to_string());
        }

        mapping
    }
}

/// Layer names in first-seen order, each once.
fn distinct_names(layers: &[LayerInfo]) -> Vec<&str> {
    let mut seen = HashSet::new();
    layers
        .iter()
        .map(|layer| layer.layer_name.as_str())
        .filter(|name| seen.insert(*name))
        .collect()
}

fn is_text_candidate(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if FILE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }
    if SYSTEM_LAYER_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return false;
    }
    let mentions_text = lower.contains("txt") || lower.contains("text");
    let plain_words = !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == ' ' || c == '_' || c == '-');
    mentions_text || plain_words
}

/// The last run of digits in a name.
fn numeric_suffix(name: &str) -> Option<u64> {
    let end = name.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = name[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    name[start..end].parse().ok()
}

fn log_unmapped(template_id: TemplateId, layers: &[LayerInfo], mapping: &LayerMapping) {
    let mapped: HashSet<&str> = mapping.values().map(String::as_str).collect();
    let unmapped: Vec<&str> = distinct_names(layers)
        .into_iter()
        .filter(|name| !mapped.contains(name))
        .collect();

    if !unmapped.is_empty() {
        tracing::warn!(
            template_id = %template_id,
            unmapped = ?unmapped,
            "Template layers left unmapped; consider a predefined mapping or new pattern"
        );
    }
}
