pub mod city;
pub mod dataset;
pub mod prediction;
pub mod record;

pub use city::*;
pub use dataset::*;
pub use prediction::*;
pub use record::*;
