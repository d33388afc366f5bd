use crate::engine::action::ActionSignal;
use crate::engine::checkpoint::TensorRecord;
use crate::engine::config::SolverConfig;
use crate::engine::error::SolverError;
use crate::engine::network::ScoringNetwork;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::solver::InputOptSolver;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct OptimizeResult {
    pub iterations: usize,
    pub current_step: usize,
    pub smoothed_loss: f32,
    pub stopped_early: bool,
    pub snapshots: Vec<PathBuf>,
    pub input: TensorRecord,
}

#[instrument(skip_all, name = "optimize_workflow")]
pub fn run<N: ScoringNetwork>(
    network: N,
    config: &SolverConfig,
    resume: Option<&Path>,
    actions: Option<ActionSignal>,
    reporter: &ProgressReporter,
) -> Result<OptimizeResult, SolverError> {
    info!(
        max_iter = config.max_iter,
        base_lr = config.learning_rate.base_lr,
        momentum = config.momentum,
        threshold = config.threshold_update,
        "Starting input optimization workflow."
    );
    reporter.report(Progress::Message(format!(
        "Optimizing input grid for up to {} iterations",
        config.max_iter
    )));

    let forward = ProgressReporter::with_callback(Box::new(move |event| reporter.report(event)));
    let mut solver = InputOptSolver::new(config.clone(), network)?.with_progress(forward);
    if let Some(signal) = actions {
        solver = solver.with_action_signal(signal);
    }

    solver.solve(resume)?;

    let input = solver
        .input()
        .map(TensorRecord::from_tensor)
        .ok_or_else(|| SolverError::Internal("optimized input tensor is missing".to_string()))?;
    let result = OptimizeResult {
        iterations: solver.iter(),
        current_step: solver.current_step(),
        smoothed_loss: solver.smoothed_loss(),
        stopped_early: solver.requested_early_exit(),
        snapshots: solver.snapshots().to_vec(),
        input,
    };
    info!(
        iterations = result.iterations,
        loss = result.smoothed_loss,
        stopped_early = result.stopped_early,
        snapshots = result.snapshots.len(),
        "Input optimization workflow finished."
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::SolverAction;
    use crate::engine::checkpoint::SolverState;
    use crate::engine::config::{LearningRatePolicy, SnapshotFormat, SolverConfigBuilder};
    use crate::engine::reference::TargetDensityNetwork;
    use crate::engine::tensor::Tensor;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn target() -> Tensor {
        Tensor::from_data(vec![2, 2], vec![1.0, 0.0, 0.5, 2.0]).unwrap()
    }

    fn config(prefix: PathBuf, max_iter: usize) -> SolverConfig {
        SolverConfigBuilder::new()
            .base_lr(0.2)
            .lr_policy(LearningRatePolicy::Fixed)
            .momentum(0.5)
            .max_iter(max_iter)
            .display(10)
            .snapshot(10)
            .snapshot_prefix(prefix)
            .snapshot_format(SnapshotFormat::Structured)
            .build()
            .unwrap()
    }

    #[test]
    fn run_optimizes_towards_target_and_snapshots() {
        let dir = tempdir().unwrap();
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::Snapshot { path } = event {
                events.lock().unwrap().push(path);
            }
        }));

        let result = run(
            TargetDensityNetwork::from_target(target()),
            &config(dir.path().join("opt"), 25),
            None,
            None,
            &reporter,
        )
        .unwrap();
        drop(reporter);

        assert_eq!(result.iterations, 25);
        assert!(!result.stopped_early);
        // periodic at 10 and 20, then the after-training snapshot at 25
        assert_eq!(result.snapshots.len(), 3);
        assert_eq!(events.into_inner().unwrap(), result.snapshots);
        for (value, goal) in result.input.data.iter().zip(target().data()) {
            assert!((value - goal).abs() < 1e-2);
        }
        assert!(dir.path().join("opt_iter_25.weights.toml").exists());
    }

    #[test]
    fn run_resumes_from_saved_state() {
        let dir = tempdir().unwrap();
        let reporter = ProgressReporter::new();
        let first = run(
            TargetDensityNetwork::from_target(target()),
            &config(dir.path().join("opt"), 10),
            None,
            None,
            &reporter,
        )
        .unwrap();
        let saved = &first.snapshots[0];
        assert_eq!(SolverState::load(saved).unwrap().iter, 10);

        let resumed = run(
            TargetDensityNetwork::from_target(target()),
            &config(dir.path().join("opt"), 15),
            Some(saved.as_path()),
            None,
            &reporter,
        )
        .unwrap();
        assert_eq!(resumed.iterations, 15);

        let straight = run(
            TargetDensityNetwork::from_target(target()),
            &config(dir.path().join("straight"), 15),
            None,
            None,
            &reporter,
        )
        .unwrap();
        for (a, b) in resumed.input.data.iter().zip(&straight.input.data) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn run_reports_early_stop() {
        let dir = tempdir().unwrap();
        let signal = ActionSignal::new();
        signal.request(SolverAction::Stop);
        let result = run(
            TargetDensityNetwork::from_target(target()),
            &config(dir.path().join("opt"), 50),
            None,
            Some(signal),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(result.iterations, 1);
        assert!(result.stopped_early);
        assert_eq!(result.snapshots.len(), 1);
    }
}
