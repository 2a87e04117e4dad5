/*!
Reconciliation of cancer-registry datasets.

An uploaded table goes through a fixed sequence of stages before its records
are consolidated into the registry:

1. the [schema](schema) is checked against the required columns, and missing
   columns can be mapped from existing ones,
2. [duplicates](duplicates) are detected and resolved on the registration
   number,
3. the codes are auto-corrected and the records validated by external
   [services](services),
4. the valid records are [stratified](stratify) along several dimensions,
5. the valid records and their stratification are sent for consolidation.

The [`pipeline::Wizard`] sequences these stages over a single working
dataset. Each stage is also available as a plain function.

See the [quick start](quick_start) and the [manual](manual).
*/

mod config;
pub use crate::config::*;

pub mod builder;
pub mod dates;
pub mod duplicates;
pub mod manual;
pub mod pipeline;
pub mod quick_start;
pub mod schema;
pub mod services;
pub mod stratify;

pub use crate::duplicates::{detect, resolve, Duplicate, DuplicateKind, Resolution};
pub use crate::pipeline::{Session, Stage, Wizard};
pub use crate::schema::{apply_mapping, missing_columns, ColumnMapping, InferredSchema};
pub use crate::stratify::{stratify, Dimension, StratificationResult};
