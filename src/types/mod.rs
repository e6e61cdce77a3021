pub mod chunk;
pub mod location;
