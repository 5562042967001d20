pub mod common;
pub mod entity;
pub mod join;
pub mod link;
pub mod schema;

pub use common::*;
pub use entity::*;
pub use join::*;
pub use link::*;
pub use schema::*;
