//! Common types for IXP peering orchestration.
//!
//! This crate provides type-safe representations of the primitives shared
//! by the peering control plane:
//!
//! - [`Asn`]: Autonomous system numbers
//! - [`GroupId`]: Isolation-domain groups an AS belongs to
//! - [`AsPair`]: Unordered AS pairs in canonical (low, high) order
//! - [`BandwidthTier`] / [`BandwidthRange`]: Link capacity classes
//! - [`LinkType`]: How a peering link is realized

mod asn;
mod bandwidth;
mod link_type;

pub use asn::{AsPair, Asn, GroupId};
pub use bandwidth::{BandwidthRange, BandwidthTier};
pub use link_type::LinkType;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid AS number: {0}")]
    InvalidAsn(String),

    #[error("invalid group id: {0}")]
    InvalidGroupId(String),

    #[error("invalid AS pair: {0}")]
    InvalidAsPair(String),

    #[error("AS pair must name two distinct ASes (got {0} twice)")]
    SelfPair(u32),

    #[error("invalid bandwidth tier: {0}")]
    InvalidBandwidthTier(String),

    #[error("invalid bandwidth range: min {min} exceeds max {max}")]
    InvalidBandwidthRange { min: String, max: String },

    #[error("invalid link type: {0}")]
    InvalidLinkType(String),
}
