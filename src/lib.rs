//! Crime record feature engineering, multi-target ensemble training and
//! forward prediction synthesis.

pub mod config;
pub mod error;
pub mod ml;
pub mod models;

pub use error::{AppError, Result};
