use posegrad::engine::config::SolverConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub target_path: PathBuf,
    pub init_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub resume_path: Option<PathBuf>,
    pub solver: SolverConfig,
}
