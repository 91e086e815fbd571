//! Feature Engineering Engine
//!
//! Per-melt aggregation over the converter process tables and assembly of
//! the flat feature table used for melt outcome modeling.

mod aggregator;
mod assembler;
mod error;
mod events;
mod features;
mod gas;
mod materials;
mod schema;
mod static_attrs;
mod statistics;

pub use aggregator::{Aggregator, MELT_END};
pub use assembler::{FeatureAssembler, FeatureConfig};
pub use error::FeatureError;
pub use events::{EventAggregator, EventStatistic, LabelMatch, Measure, EVENT_CATALOGUE};
pub use features::{FeatureTable, FeatureTableInfo, TARGET_COLUMNS};
pub use gas::{GasAggregator, GasWindowAggregator, WindowSpec, GAS_CHANNELS};
pub use materials::{Material, MaterialAggregator, MATERIAL_CATALOGUE};
pub use schema::{validate, AggregatorSchema, FeatureColumn, FittedSchema, SemanticType};
pub use static_attrs::{StaticJoiner, CHUGUN_COLUMNS, PLAVKI_COLUMNS};
pub use statistics::{percentile_cont, Summary};
