//! Tier-1 and tier-2 document renderers.

pub mod minimal;
pub mod portfolio;
