// Graph queries over the index

pub mod graph;

pub use graph::{impact_radius, KnowledgeGraph};
