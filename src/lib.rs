pub mod cli;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod model;
pub mod progress;

mod api;

pub use api::{ShallowRef, ShallowRefBuilder};
pub use fetch::{FetchError, FetchOutcome, ShallowRefFetcher};
pub use model::{FailurePolicy, FetchRequest};
