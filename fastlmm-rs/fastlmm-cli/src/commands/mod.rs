pub mod common;
pub mod eigen;
pub mod learn;
pub mod model_stats;
pub mod predict;
pub mod single_snp;
