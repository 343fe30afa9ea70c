//! Asset instructions.
//!
//! Builds the per-layer replacement list for a render. Only fields present
//! in the payload produce an instruction; everything else keeps the
//! template's own default.

use serde::{Deserialize, Serialize};

use crate::customization::{hex_to_rgb, Customization, FieldKind, FIELDS};
use crate::template::LayerMapping;

/// One layer replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetInstruction {
    /// Replace a text layer's source text.
    Text {
        /// Target layer.
        layer_name: String,
        /// New text.
        value: String,
    },
    /// Replace an image layer's footage.
    Image {
        /// Target layer.
        layer_name: String,
        /// Image URL.
        src: String,
    },
    /// Replace a video layer's footage.
    Video {
        /// Target layer.
        layer_name: String,
        /// Video URL.
        src: String,
    },
    /// Set a layer's fill colour.
    Color {
        /// Target layer.
        layer_name: String,
        /// Channels in `[0, 1]`.
        rgb: [f64; 3],
    },
}

impl AssetInstruction {
    /// Target layer name.
    #[must_use]
    pub fn layer_name(&self) -> &str {
        match self {
            Self::Text { layer_name, .. }
            | Self::Image { layer_name, .. }
            | Self::Video { layer_name, .. }
            | Self::Color { layer_name, .. } => layer_name,
        }
    }
}

/// Build instructions for a validated customization.
///
/// Output order follows [`FIELDS`]. The layer name is the mapping entry for
/// the field, falling back to the field's default layer name. Colour values
/// that fail to parse are skipped; [`Customization`] values have already
/// been validated, so this only happens for hand-built inputs.
#[must_use]
pub fn build_assets(customization: &Customization, mapping: &LayerMapping) -> Vec<AssetInstruction> {
    let mut assets = Vec::new();

    for spec in FIELDS {
        let Some(value) = customization.first_of(spec.aliases) else {
            continue;
        };
        let layer_name = mapping
            .get(spec.field)
            .cloned()
            .unwrap_or_else(|| spec.default_layer.to_string());

        let instruction = match spec.kind {
            FieldKind::Text => AssetInstruction::Text {
                layer_name,
                value: value.to_string(),
            },
            FieldKind::Image => AssetInstruction::Image {
                layer_name,
                src: value.to_string(),
            },
            FieldKind::Video => AssetInstruction::Video {
                layer_name,
                src: value.to_string(),
            },
            FieldKind::Color => match hex_to_rgb(value) {
                Ok(rgb) => AssetInstruction::Color { layer_name, rgb },
                Err(_) => {
                    tracing::warn!(field = spec.field, value, "Skipping malformed colour");
                    continue;
                }
            },
        };
        assets.push(instruction);
    }

    assets
}
