//! Template registration records.
//!
//! One record per catalog template. The provider asset id is present exactly
//! while the record is awaiting upload or uploaded; the transition methods
//! below are the only way status changes, which keeps that invariant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TemplateId;

/// Mapping from semantic field name (`text1`, `image2`, ...) to literal layer name.
pub type LayerMapping = BTreeMap<String, String>;

/// A layer reported by the provider for an uploaded template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    /// Literal layer name.
    pub layer_name: String,
    /// Composition containing the layer.
    pub composition: String,
}

impl LayerInfo {
    /// Convenience constructor.
    pub fn new(layer_name: impl Into<String>, composition: impl Into<String>) -> Self {
        Self {
            layer_name: layer_name.into(),
            composition: composition.into(),
        }
    }
}

/// Registration status with the render provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    /// Nothing registered yet.
    NotRegistered,
    /// Registered; binary upload or provider processing still in flight.
    AwaitingUpload,
    /// Ready for rendering.
    Uploaded,
    /// Registration or upload failed.
    Error,
}

/// A template's registration with the render provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRegistration {
    /// Catalog id.
    pub template_id: TemplateId,

    /// Provider asset id.
    pub provider_asset_id: Option<String>,

    /// Display name used on the provider side.
    pub display_name: String,

    /// Registration status.
    pub status: TemplateStatus,

    /// Compositions exposed by the asset, in provider order.
    pub compositions: Vec<String>,

    /// Layers reported by the provider.
    pub layers: Vec<LayerInfo>,

    /// Resolved field-to-layer mapping.
    pub layer_mapping: Option<LayerMapping>,

    /// Last failure, for operators.
    pub last_error: Option<String>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl TemplateRegistration {
    /// Provider display name for a catalog template.
    #[must_use]
    pub fn display_name_for(template_id: TemplateId) -> String {
        format!("template_{template_id}")
    }

    /// A fresh, unregistered record.
    #[must_use]
    pub fn new(template_id: TemplateId) -> Self {
        let now = Utc::now();
        Self {
            template_id,
            provider_asset_id: None,
            display_name: Self::display_name_for(template_id),
            status: TemplateStatus::NotRegistered,
            compositions: Vec::new(),
            layers: Vec::new(),
            layer_mapping: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Registered with the provider, upload pending.
    pub fn awaiting_upload(&mut self, provider_asset_id: String) {
        self.provider_asset_id = Some(provider_asset_id);
        self.status = TemplateStatus::AwaitingUpload;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// The provider reports the asset ready.
    pub fn mark_uploaded(
        &mut self,
        provider_asset_id: String,
        compositions: Vec<String>,
        layers: Vec<LayerInfo>,
        layer_mapping: LayerMapping,
    ) {
        self.provider_asset_id = Some(provider_asset_id);
        self.status = TemplateStatus::Uploaded;
        self.compositions = compositions;
        self.layers = layers;
        self.layer_mapping = Some(layer_mapping);
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Registration or upload failed; the provider asset is abandoned.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.provider_asset_id = None;
        self.status = TemplateStatus::Error;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Uploaded with a known asset id.
    #[must_use]
    pub fn ready_asset_id(&self) -> Option<&str> {
        match self.status {
            TemplateStatus::Uploaded => self.provider_asset_id.as_deref(),
            _ => None,
        }
    }

    /// First composition, the render target.
    #[must_use]
    pub fn primary_composition(&self) -> Option<&str> {
        self.compositions.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u32) -> TemplateId {
        TemplateId::new(n).unwrap()
    }

    #[test]
    fn asset_id_follows_status() {
        let mut reg = TemplateRegistration::new(tid(4));
        assert_eq!(reg.display_name, "template_4");
        assert!(reg.provider_asset_id.is_none());

        reg.awaiting_upload("asset_1".into());
        assert_eq!(reg.status, TemplateStatus::AwaitingUpload);
        assert!(reg.ready_asset_id().is_none());

        reg.mark_uploaded(
            "asset_1".into(),
            vec!["Main".into()],
            vec![LayerInfo::new("txt_1", "Main")],
            LayerMapping::new(),
        );
        assert_eq!(reg.ready_asset_id(), Some("asset_1"));
        assert_eq!(reg.primary_composition(), Some("Main"));

        reg.mark_error("gone");
        assert!(reg.provider_asset_id.is_none());
        assert_eq!(reg.last_error.as_deref(), Some("gone"));
    }

    #[test]
    fn layer_info_uses_provider_field_names() {
        let json = serde_json::to_value(LayerInfo::new("txt_1", "Main")).unwrap();
        assert_eq!(json, serde_json::json!({"layerName": "txt_1", "composition": "Main"}));
    }
}
