pub mod aggregate;
pub mod config;
pub mod duck;
pub mod load;
pub mod materialize;
pub mod model;
pub mod pipeline;
pub mod pivot;

pub use aggregate::aggregate;
pub use config::{Config, StoreKind};
pub use duck::StagingStore;
pub use load::load_records;
pub use materialize::{MaterializeReport, Materializer, PivotSource};
pub use model::{GroupedRecord, PivotedRecord, RawRecord};
pub use pipeline::{run, RunSummary};
pub use pivot::{pivot, PathMode};
