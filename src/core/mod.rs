pub mod etl;

pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
