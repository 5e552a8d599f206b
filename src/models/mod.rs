pub mod analysis;
pub mod enums;
pub mod history;
pub mod patient;
pub mod report;

pub use analysis::*;
pub use enums::*;
pub use history::*;
pub use patient::*;
pub use report::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: &'static str, value: String },
}
