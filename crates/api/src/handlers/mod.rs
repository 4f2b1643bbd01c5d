pub mod assets;
pub mod generation;
pub mod jobs;
pub mod provider;
