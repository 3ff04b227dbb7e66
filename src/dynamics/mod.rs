//! Field integrator: advects foreground pixels along the predicted flow.
//!
//! - [`options`] – integration knobs and the per-image iteration budget.
//! - `interp` – sub-pixel sampling of the displacement field.
//! - [`integrate`] – the Euler loop producing [`Integration`] results.
//!
//! Integration is deterministic and never fails on numerical grounds; the
//! only errors are shape mismatches between the flow and foreground mask.

pub mod integrate;
mod interp;
pub mod options;

pub use integrate::{follow_flows, foreground_mask, Integration, MIN_FOREGROUND_PIXELS};
pub use options::{IntegrationOptions, IterationBudget, MAX_ITERATIONS};
