pub mod differ;
pub mod engine;
pub mod pipeline;
pub mod report;

pub use crate::domain::model::{
    ChangeCategory, ChangeKind, ChangeReport, DiffResult, FieldChange, RunSummary, Snapshot,
};
pub use crate::domain::ports::{ConfigProvider, Notifier, Pipeline, Storage};
pub use crate::utils::error::Result;
