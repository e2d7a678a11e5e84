//! Value types shared by the connector, the workers and the client implementations.

mod load;
mod options;
mod table;

pub use load::{
    CreateDisposition, FieldMode, FieldType, JobError, LoadJobConfig, SchemaField,
    WriteDisposition,
};
pub use options::{FetchOptions, MaterializeOptions, PushOptions};
pub use table::TableReference;
