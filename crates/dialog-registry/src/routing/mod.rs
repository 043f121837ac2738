//! Dialog matching for in-dialog requests

pub mod dialog_matcher;

pub use dialog_matcher::{match_dialog, match_downstream, Direction};
