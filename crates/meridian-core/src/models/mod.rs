//! Domain models for the Meridian engine.

mod analysis;
mod estimate;
mod extraction;
mod meds;
mod ontology;
mod paper;
mod pooled;
mod risk;

pub use analysis::*;
pub use estimate::*;
pub use extraction::*;
pub use meds::*;
pub use ontology::*;
pub use paper::*;
pub use pooled::*;
pub use risk::*;
