//! Configuration schema, defaults and visibility rules
//!
//! - **schema**: field paths, value kinds and domains
//! - **defaults**: the baseline value set
//! - **visibility**: advanced-mode gating of field groups

pub mod defaults;
pub mod schema;
pub mod visibility;

pub use defaults::{default_value, defaults};
pub use schema::{
    FieldDomain, FieldError, FieldGroup, FieldPath, FieldValue, FilteringType, ValueSet,
};
pub use visibility::{is_relevant, relevant_view, VisibilityMode};
