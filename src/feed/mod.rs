pub mod poll;
pub mod source;

pub use poll::{PollController, PollHandle, PollOutcome, ViewStatus};
pub use source::{fingerprint, CsvSource, HttpCsvSource, Reply, ScriptedSource};
