pub mod json;
pub mod principal;

pub use json::{Json, ValidatedJson};
