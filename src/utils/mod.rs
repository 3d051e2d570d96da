pub mod report;

pub use report::{Checks, DiagReport};
