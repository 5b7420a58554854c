pub mod driver;
pub mod engine;
pub mod fixtures;
pub mod js;
pub mod opts;
pub mod suite;
