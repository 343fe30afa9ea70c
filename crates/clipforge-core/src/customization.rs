//! Customization payloads.
//!
//! Users send an arbitrary JSON object of field values. Several semantic
//! fields accept more than one input name; [`FIELDS`] lists them in the order
//! asset instructions are emitted, each with its aliases in priority order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// What kind of layer replacement a field produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Source text replacement.
    Text,
    /// Image footage replacement (images, icons, backgrounds).
    Image,
    /// Video footage replacement.
    Video,
    /// Fill colour, given as `#RRGGBB`.
    Color,
}

/// A semantic customization field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Semantic name, also the key in a layer mapping.
    pub field: &'static str,
    /// Accepted input names, first populated one wins.
    pub aliases: &'static [&'static str],
    /// Replacement kind.
    pub kind: FieldKind,
    /// Layer name used when the mapping has no entry for the field.
    pub default_layer: &'static str,
}

const fn spec(
    field: &'static str,
    aliases: &'static [&'static str],
    kind: FieldKind,
    default_layer: &'static str,
) -> FieldSpec {
    FieldSpec {
        field,
        aliases,
        kind,
        default_layer,
    }
}

/// All supported fields, in instruction order.
pub const FIELDS: &[FieldSpec] = &[
    spec("text1", &["text1", "headline", "title"], FieldKind::Text, "Text 1"),
    spec("text2", &["text2", "subheadline", "subtitle"], FieldKind::Text, "Text 2"),
    spec("text3", &["text3", "description", "body"], FieldKind::Text, "Text 3"),
    spec("text4", &["text4", "callToAction", "cta"], FieldKind::Text, "Text 4"),
    spec("image1", &["image1", "logo"], FieldKind::Image, "Image 1"),
    spec("image2", &["image2"], FieldKind::Image, "Image 2"),
    spec("image3", &["image3"], FieldKind::Image, "Image 3"),
    spec("image4", &["image4"], FieldKind::Image, "Image 4"),
    spec("icon1", &["icon1"], FieldKind::Image, "Icon 1"),
    spec("icon2", &["icon2"], FieldKind::Image, "Icon 2"),
    spec("icon3", &["icon3"], FieldKind::Image, "Icon 3"),
    spec("icon4", &["icon4"], FieldKind::Image, "Icon 4"),
    spec("background", &["background", "backgroundImage"], FieldKind::Image, "Background"),
    spec("productImage", &["productImage", "product"], FieldKind::Image, "Product Image"),
    spec("image", &["image"], FieldKind::Image, "Image"),
    spec("video1", &["video1", "video"], FieldKind::Video, "Video 1"),
    spec("video2", &["video2"], FieldKind::Video, "Video 2"),
    spec("color1", &["color1", "primaryColor"], FieldKind::Color, "Primary Color"),
    spec("color2", &["color2", "secondaryColor"], FieldKind::Color, "Secondary Color"),
    spec("backgroundColor", &["backgroundColor"], FieldKind::Color, "Background Color"),
];

/// Look up the kind of an input name, across all aliases.
#[must_use]
pub fn kind_of(input_name: &str) -> Option<FieldKind> {
    FIELDS
        .iter()
        .find(|spec| spec.aliases.contains(&input_name))
        .map(|spec| spec.kind)
}

/// Raw customization payload as received from the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomizationRequest(pub serde_json::Map<String, serde_json::Value>);

impl CustomizationRequest {
    /// Validate into a [`Customization`].
    ///
    /// Nulls and empty strings are dropped; they mean "use the template default".
    ///
    /// # Errors
    ///
    /// Returns `RenderError::Validation` for non-string values, malformed
    /// colours and non-HTTP media URLs.
    pub fn validate(&self) -> Result<Customization> {
        let mut values = BTreeMap::new();

        for (name, value) in &self.0 {
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s.trim(),
                _ => {
                    return Err(RenderError::Validation(format!(
                        "field `{name}` must be a string"
                    )))
                }
            };
            if text.is_empty() {
                continue;
            }

            match kind_of(name) {
                Some(FieldKind::Color) => {
                    hex_to_rgb(text).map_err(|_| {
                        RenderError::Validation(format!(
                            "field `{name}` must be a #RRGGBB colour, got `{text}`"
                        ))
                    })?;
                }
                Some(FieldKind::Image | FieldKind::Video) => {
                    if !is_http_url(text) {
                        return Err(RenderError::Validation(format!(
                            "field `{name}` must be an http(s) URL"
                        )));
                    }
                }
                Some(FieldKind::Text) | None => {}
            }

            values.insert(name.clone(), text.to_string());
        }

        Ok(Customization { values })
    }

    /// JSON snapshot stored on the render job.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.clone())
    }
}

/// A validated customization: non-empty string values by input name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Customization {
    values: BTreeMap<String, String>,
}

impl Customization {
    /// First populated alias, in priority order.
    #[must_use]
    pub fn first_of(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .find_map(|alias| self.values.get(*alias))
            .map(String::as_str)
    }

    /// Whether no field was provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Customization {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn is_http_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

/// Error for a malformed hex colour.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex colour")]
pub struct InvalidColor;

/// Convert `#RRGGBB` (leading `#` optional) to channels in `[0, 1]`.
///
/// # Errors
///
/// Returns `InvalidColor` unless the input is exactly six hex digits.
pub fn hex_to_rgb(hex: &str) -> std::result::Result<[f64; 3], InvalidColor> {
    let digits = hex.trim().strip_prefix('#').unwrap_or(hex.trim());
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InvalidColor);
    }

    let channel = |range: std::ops::Range<usize>| -> std::result::Result<f64, InvalidColor> {
        let raw = digits.get(range).ok_or(InvalidColor)?;
        let value = u8::from_str_radix(raw, 16).map_err(|_| InvalidColor)?;
        Ok(f64::from(value) / 255.0)
    };

    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}
