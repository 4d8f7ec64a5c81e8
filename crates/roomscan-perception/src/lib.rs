//! `roomscan-perception` – geometric room analysis.
//!
//! Turns a raw point-cloud scan of a room into the structured facts a
//! planner or a floor-plan API needs: how big the room is, what furniture
//! stands in it and which pieces are next to each other.
//!
//! # Modules
//!
//! - [`config`] – [`PipelineConfig`][config::PipelineConfig]: every tunable
//!   threshold, validated once.
//! - [`octree`] – [`Octree`][octree::Octree]: spatial index behind every
//!   neighbour search.
//! - [`preprocess`] – outlier removal, voxel downsampling, PCA normals.
//! - [`planes`] – RANSAC plane extraction and floor/ceiling/wall roles.
//! - [`dimensions`] – length, width and height from wall pairs.
//! - [`clustering`] – DBSCAN over the points no plane claimed.
//! - [`classify`] – [`RuleTable`][classify::RuleTable]: ordered geometric
//!   rules mapping clusters to furniture types.
//! - [`relations`] – adjacency / proximity between objects and free floor
//!   space.
//! - [`quality`] – scan-quality score of the raw input.
//! - [`pipeline`] – [`RoomPipeline`][pipeline::RoomPipeline]: all of the
//!   above in order.
//! - [`synthetic`] – [`SyntheticRoom`][synthetic::SyntheticRoom]: seeded
//!   synthetic scans.

pub mod classify;
pub mod clustering;
pub mod config;
pub mod dimensions;
pub mod octree;
pub mod pipeline;
pub mod planes;
pub mod preprocess;
pub mod quality;
pub mod relations;
pub mod synthetic;

pub use config::PipelineConfig;
pub use pipeline::{RoomPipeline, report_schema};
