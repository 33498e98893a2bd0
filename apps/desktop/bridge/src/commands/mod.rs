pub mod call;
pub mod host;
