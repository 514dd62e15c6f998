//! Detección de cambios: tipos de mutación, normalización y diff.

mod diff;
mod normalizer;
pub mod text;
mod types;

pub use diff::{diff, Diff};
pub use normalizer::{normalize, normalize_change, NormalizedChange};
pub use types::{Operation, RawRecord, Record, TrackedEntityChange};
