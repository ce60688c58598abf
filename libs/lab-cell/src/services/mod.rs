pub mod catalog;
pub mod results;
