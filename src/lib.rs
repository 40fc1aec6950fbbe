// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::op_ref
)]

//! Line plan reconstruction for pipeline sensor maps.
//!
//! Raw colored polyline fragments are stitched into continuous paths,
//! simplified, fitted to a view box, and every sensor record is resolved to
//! the line it belongs to before its label is placed. [`pipeline::build_plan`]
//! is the entry point; everything it returns is in [`plan`].

pub mod assignment;
pub mod config;
pub mod error;
pub mod geometry_utils;
pub mod label_placement;
pub mod map_geometry;
pub mod overrides;
pub mod pipeline;
pub mod plan;
pub mod sensor_text;
pub mod simplify;
pub mod sources;
pub mod stitching;
pub mod transform;

#[cfg(test)]
mod test_scenarios;

pub use config::PlanConfig;
pub use pipeline::{build_plan, build_plans};
pub use plan::Plan;
