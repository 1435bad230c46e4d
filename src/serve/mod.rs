//! Certificate delivery over local HTTP.

pub mod handoff;
