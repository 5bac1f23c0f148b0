//! Peering policies: value types and the submit/withdraw model.

mod model;
mod types;

pub use model::PolicyModel;
pub use types::{
    LinkPreferences, PeeringPolicy, PolicyDraft, PolicyId, PolicyRef, PolicyStatus, Revision,
    Selector, SelectorSet,
};
