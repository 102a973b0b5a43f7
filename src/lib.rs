pub mod aws;
pub mod retention;
