pub mod dependency;
pub mod model;
pub mod persistence;
pub mod render;
pub mod tables;
pub mod tree;
pub mod walker;
