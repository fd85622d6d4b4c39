/*
[INPUT]:  Subscription selections and hub method names
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions shared across the workspace
[UPDATE]: When key shape, snapshot metadata or method names change
*/

pub mod enums;
pub mod models;

pub use enums::*;
pub use models::*;
