//! Core types and algorithms for clipforge.
//!
//! This crate holds everything about a render that does not touch the
//! network or the disk:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `RenderJobId`, `TemplateId`
//! - **Accounts**: `Account`, `Plan`
//! - **Credits**: `CreditTransaction`, `TransactionType`
//! - **Jobs**: `RenderJob`, `JobStatus`
//! - **Templates**: `TemplateRegistration`, `LayerInfo`, `LayerMapping`
//! - **Customization**: payload validation and `hex_to_rgb`
//! - **Mapping**: `LayerMappingResolver`, semantic field to layer name
//! - **Assets**: `build_assets`, customization plus mapping to layer replacements
//!
//! # Credits
//!
//! **1 render = 1 credit.** Balances are `i64` and never go negative; the
//! debit is refunded if the render fails.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod assets;
pub mod credits;
pub mod customization;
pub mod error;
pub mod ids;
pub mod job;
pub mod mapping;
pub mod template;

pub use account::{Account, Plan};
pub use assets::{build_assets, AssetInstruction};
pub use credits::{CreditTransaction, TransactionType};
pub use customization::{hex_to_rgb, Customization, CustomizationRequest, FieldKind, FIELDS};
pub use error::{RenderError, Result};
pub use ids::{IdError, RenderJobId, TemplateId, TransactionId, UserId};
pub use job::{JobStatus, RenderJob, RENDER_CREDIT_COST};
pub use mapping::{FieldPatterns, LayerMappingResolver, MappingTables};
pub use template::{LayerInfo, LayerMapping, TemplateRegistration, TemplateStatus};
