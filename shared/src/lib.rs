pub mod data;
pub mod validation;
