pub mod cleaner;
pub mod merger;
pub mod normalizer;
pub mod orchestrator;
pub mod quality;
