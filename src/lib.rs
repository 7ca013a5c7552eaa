pub mod config;
pub mod geometry;
pub mod heat;
pub mod plan;
pub mod sampling;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod web;

pub use config::Config;
pub use geometry::{GeoPoint, Polygon};
pub use session::{EditMode, PolygonEditSession, ValiditySignal};
pub use store::{Territory, TerritoryId, TerritoryStore};
