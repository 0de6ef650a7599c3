//! Prompt protection — template-bound construction and response scrubbing.

pub mod analysis;
pub mod response;
pub mod template;
