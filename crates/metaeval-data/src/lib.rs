//! metaeval-data: evaluation datasets and generated-response records.
//!
//! A dataset is one JSON document with two top-level collections:
//! `instances` (each carrying an integer `id` plus free-form fields, one of
//! which holds the prompt text) and `annotations` (one JSON object per
//! annotation dimension). Loading validates that shape up front so a
//! malformed file is rejected before any model work starts.

pub mod error;
pub mod io;
pub mod schema;

pub use error::{DatasetError, Result};
pub use io::{load_dataset, write_responses, ResponseFile, ResponseRecord};
pub use schema::{Annotation, Dataset, Instance};
