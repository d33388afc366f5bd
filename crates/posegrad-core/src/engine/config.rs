use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Unknown execution mode: '{0}' (expected 'cpu' or 'accelerator')")]
    UnknownExecutionMode(String),
    #[error("Unknown learning rate policy: '{0}'")]
    UnknownLearningRatePolicy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LearningRatePolicy {
    #[default]
    Fixed,
    Step,
    Exp,
    Inv,
    MultiStep,
    Poly,
    Sigmoid,
}

impl LearningRatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningRatePolicy::Fixed => "fixed",
            LearningRatePolicy::Step => "step",
            LearningRatePolicy::Exp => "exp",
            LearningRatePolicy::Inv => "inv",
            LearningRatePolicy::MultiStep => "multistep",
            LearningRatePolicy::Poly => "poly",
            LearningRatePolicy::Sigmoid => "sigmoid",
        }
    }
}

impl fmt::Display for LearningRatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LearningRatePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(LearningRatePolicy::Fixed),
            "step" => Ok(LearningRatePolicy::Step),
            "exp" => Ok(LearningRatePolicy::Exp),
            "inv" => Ok(LearningRatePolicy::Inv),
            "multistep" => Ok(LearningRatePolicy::MultiStep),
            "poly" => Ok(LearningRatePolicy::Poly),
            "sigmoid" => Ok(LearningRatePolicy::Sigmoid),
            _ => Err(ConfigError::UnknownLearningRatePolicy(s.to_string())),
        }
    }
}

/// Where the element-wise update work runs. Chosen once per solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    #[default]
    Cpu,
    Accelerator,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Cpu => f.write_str("cpu"),
            ExecutionMode::Accelerator => f.write_str("accelerator"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(ExecutionMode::Cpu),
            "accelerator" | "gpu" => Ok(ExecutionMode::Accelerator),
            _ => Err(ConfigError::UnknownExecutionMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SnapshotFormat {
    #[default]
    Binary,
    Structured,
}

impl SnapshotFormat {
    pub fn state_extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Binary => ".solverstate",
            SnapshotFormat::Structured => ".solverstate.toml",
        }
    }

    pub fn weights_extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Binary => ".weights",
            SnapshotFormat::Structured => ".weights.toml",
        }
    }

    /// Infers the format of a solver-state file from its name.
    pub fn from_state_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".solverstate.toml") {
            Some(SnapshotFormat::Structured)
        } else if name.ends_with(".solverstate") {
            Some(SnapshotFormat::Binary)
        } else {
            None
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(SnapshotFormat::Binary),
            "structured" | "toml" => Ok(SnapshotFormat::Structured),
            _ => Err(ConfigError::InvalidParameter {
                name: "snapshot_format",
                reason: format!("'{}' is neither 'binary' nor 'structured'", s),
            }),
        }
    }
}

/// Channel layout of the optimized grid.
///
/// The input tensor is assumed to start with `receptor_channels` grids, then
/// `ligand_channels` grids, each of `grid_points` cells. Those cells form the
/// protected prefix that post-update thresholding never touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridLayout {
    pub receptor_channels: usize,
    pub ligand_channels: usize,
    pub grid_points: usize,
}

impl GridLayout {
    pub fn protected_len(&self) -> usize {
        (self.receptor_channels + self.ligand_channels) * self.grid_points
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearningRateConfig {
    pub base_lr: f64,
    pub policy: LearningRatePolicy,
    pub gamma: f64,
    pub power: f64,
    pub stepsize: usize,
    pub stepvalues: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotConfig {
    /// Iterations between snapshots; 0 disables periodic snapshots.
    pub interval: usize,
    pub prefix: PathBuf,
    pub format: SnapshotFormat,
    pub after_train: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestConfig {
    /// Iterations between held-out evaluations; 0 disables them.
    pub interval: usize,
    pub iterations: usize,
    pub initialization: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub learning_rate: LearningRateConfig,
    pub max_iter: usize,
    pub momentum: f64,
    /// L2 ceiling for the input gradient; negative disables clipping.
    pub clip_gradients: f64,
    pub iter_size: usize,
    pub average_loss: usize,
    pub display: usize,
    pub debug_info: bool,
    pub test: TestConfig,
    pub snapshot: SnapshotConfig,
    pub threshold_update: bool,
    pub grid: GridLayout,
    pub execution_mode: ExecutionMode,
}

#[derive(Default)]
pub struct SolverConfigBuilder {
    base_lr: Option<f64>,
    lr_policy: Option<LearningRatePolicy>,
    gamma: Option<f64>,
    power: Option<f64>,
    stepsize: Option<usize>,
    stepvalues: Vec<usize>,
    max_iter: Option<usize>,
    momentum: Option<f64>,
    clip_gradients: Option<f64>,
    iter_size: Option<usize>,
    average_loss: Option<usize>,
    display: Option<usize>,
    debug_info: bool,
    test_interval: Option<usize>,
    test_iter: Option<usize>,
    test_initialization: Option<bool>,
    snapshot: Option<usize>,
    snapshot_prefix: Option<PathBuf>,
    snapshot_format: Option<SnapshotFormat>,
    snapshot_after_train: Option<bool>,
    threshold_update: bool,
    grid: Option<GridLayout>,
    execution_mode: Option<ExecutionMode>,
}

impl SolverConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_lr(mut self, rate: f64) -> Self {
        self.base_lr = Some(rate);
        self
    }
    pub fn lr_policy(mut self, policy: LearningRatePolicy) -> Self {
        self.lr_policy = Some(policy);
        self
    }
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }
    pub fn power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }
    pub fn stepsize(mut self, stepsize: usize) -> Self {
        self.stepsize = Some(stepsize);
        self
    }
    pub fn stepvalues(mut self, values: Vec<usize>) -> Self {
        self.stepvalues = values;
        self
    }
    pub fn max_iter(mut self, iterations: usize) -> Self {
        self.max_iter = Some(iterations);
        self
    }
    pub fn momentum(mut self, momentum: f64) -> Self {
        self.momentum = Some(momentum);
        self
    }
    pub fn clip_gradients(mut self, ceiling: f64) -> Self {
        self.clip_gradients = Some(ceiling);
        self
    }
    pub fn iter_size(mut self, size: usize) -> Self {
        self.iter_size = Some(size);
        self
    }
    pub fn average_loss(mut self, window: usize) -> Self {
        self.average_loss = Some(window);
        self
    }
    pub fn display(mut self, interval: usize) -> Self {
        self.display = Some(interval);
        self
    }
    pub fn debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }
    pub fn test_interval(mut self, interval: usize) -> Self {
        self.test_interval = Some(interval);
        self
    }
    pub fn test_iter(mut self, iterations: usize) -> Self {
        self.test_iter = Some(iterations);
        self
    }
    pub fn test_initialization(mut self, enabled: bool) -> Self {
        self.test_initialization = Some(enabled);
        self
    }
    pub fn snapshot(mut self, interval: usize) -> Self {
        self.snapshot = Some(interval);
        self
    }
    pub fn snapshot_prefix(mut self, prefix: PathBuf) -> Self {
        self.snapshot_prefix = Some(prefix);
        self
    }
    pub fn snapshot_format(mut self, format: SnapshotFormat) -> Self {
        self.snapshot_format = Some(format);
        self
    }
    pub fn snapshot_after_train(mut self, enabled: bool) -> Self {
        self.snapshot_after_train = Some(enabled);
        self
    }
    pub fn threshold_update(mut self, enabled: bool) -> Self {
        self.threshold_update = enabled;
        self
    }
    pub fn grid(mut self, grid: GridLayout) -> Self {
        self.grid = Some(grid);
        self
    }
    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    pub fn build(self) -> Result<SolverConfig, ConfigError> {
        let policy = self
            .lr_policy
            .ok_or(ConfigError::MissingParameter("lr_policy"))?;
        let learning_rate = LearningRateConfig {
            base_lr: self.base_lr.ok_or(ConfigError::MissingParameter("base_lr"))?,
            policy,
            gamma: self.gamma.unwrap_or(1.0),
            power: self.power.unwrap_or(1.0),
            stepsize: self.stepsize.unwrap_or(0),
            stepvalues: self.stepvalues,
        };
        if matches!(
            policy,
            LearningRatePolicy::Step | LearningRatePolicy::Sigmoid
        ) && learning_rate.stepsize == 0
        {
            return Err(ConfigError::InvalidParameter {
                name: "stepsize",
                reason: format!("policy '{}' requires a positive stepsize", policy),
            });
        }
        if learning_rate.stepvalues.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::InvalidParameter {
                name: "stepvalues",
                reason: "values must be strictly increasing".to_string(),
            });
        }

        let iter_size = self.iter_size.unwrap_or(1);
        if iter_size == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "iter_size",
                reason: "must be at least 1".to_string(),
            });
        }
        let average_loss = self.average_loss.unwrap_or(1);
        if average_loss == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "average_loss",
                reason: "must be at least 1".to_string(),
            });
        }

        let interval = self.snapshot.unwrap_or(0);
        let after_train = self.snapshot_after_train.unwrap_or(true);
        let prefix = match self.snapshot_prefix {
            Some(prefix) => prefix,
            None if interval > 0 || after_train => {
                return Err(ConfigError::MissingParameter("snapshot_prefix"));
            }
            None => PathBuf::new(),
        };
        let snapshot = SnapshotConfig {
            interval,
            prefix,
            format: self.snapshot_format.unwrap_or_default(),
            after_train,
        };

        Ok(SolverConfig {
            learning_rate,
            max_iter: self
                .max_iter
                .ok_or(ConfigError::MissingParameter("max_iter"))?,
            momentum: self.momentum.unwrap_or(0.0),
            clip_gradients: self.clip_gradients.unwrap_or(-1.0),
            iter_size,
            average_loss,
            display: self.display.unwrap_or(0),
            debug_info: self.debug_info,
            test: TestConfig {
                interval: self.test_interval.unwrap_or(0),
                iterations: self.test_iter.unwrap_or(0),
                initialization: self.test_initialization.unwrap_or(true),
            },
            snapshot,
            threshold_update: self.threshold_update,
            grid: self.grid.unwrap_or_default(),
            execution_mode: self.execution_mode.unwrap_or_default(),
        })
    }
}
