use super::action::ActionSignal;
use super::backend::{UpdateBackend, backend_for};
use super::checkpoint::{SolverState, TensorRecord};
use super::config::SolverConfig;
use super::error::{CheckpointError, SolverError};
use super::network::{PoolingMethod, ScoringNetwork};
use super::progress::{Progress, ProgressReporter};
use super::schedule::{SmoothedLoss, learning_rate};
use super::tensor::{Tensor, TensorId};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the network tensor that is optimized.
pub const INPUT_TENSOR_NAME: &str = "data";

fn missing_input() -> SolverError {
    SolverError::Internal(format!(
        "tensor '{}' disappeared from the network",
        INPUT_TENSOR_NAME
    ))
}

/// Momentum gradient descent on a network's input grid.
///
/// The network's own parameters are never updated: their gradients may be
/// computed during the backward pass, but only the `data` tensor is stepped.
/// The solver owns the momentum history and the last applied update; the input
/// values themselves stay in the network's tensor store.
pub struct InputOptSolver<'a, N: ScoringNetwork> {
    config: SolverConfig,
    net: N,
    test_nets: Vec<Box<dyn ScoringNetwork + 'a>>,
    input: TensorId,
    history: Tensor,
    update: Tensor,
    backend: Box<dyn UpdateBackend>,
    iter: usize,
    current_step: usize,
    smoothed_loss: SmoothedLoss,
    requested_early_exit: bool,
    actions: ActionSignal,
    iterations_last: usize,
    iteration_timer: Instant,
    snapshots: Vec<PathBuf>,
    reporter: ProgressReporter<'a>,
}

impl<'a, N: ScoringNetwork> InputOptSolver<'a, N> {
    /// Binds the solver to `net` and allocates its momentum state.
    ///
    /// # Errors
    ///
    /// Fails with [`SolverError::MissingInputTensor`] if the network has no
    /// `data` tensor, and with [`SolverError::BackendUnavailable`] if the
    /// configured execution mode has no backend in this build.
    pub fn new(config: SolverConfig, net: N) -> Result<Self, SolverError> {
        let backend = backend_for(config.execution_mode)?;
        let input = net
            .tensors()
            .id(INPUT_TENSOR_NAME)
            .ok_or_else(|| SolverError::MissingInputTensor(INPUT_TENSOR_NAME.to_string()))?;
        let shape = net
            .tensors()
            .get(input)
            .ok_or_else(missing_input)?
            .shape()
            .to_vec();

        info!(
            shape = ?shape,
            backend = %config.execution_mode,
            "Initialized input optimization solver."
        );

        Ok(Self {
            smoothed_loss: SmoothedLoss::new(config.average_loss),
            history: Tensor::zeros(shape.clone()),
            update: Tensor::zeros(shape),
            config,
            net,
            test_nets: Vec::new(),
            input,
            backend,
            iter: 0,
            current_step: 0,
            requested_early_exit: false,
            actions: ActionSignal::new(),
            iterations_last: 0,
            iteration_timer: Instant::now(),
            snapshots: Vec::new(),
            reporter: ProgressReporter::new(),
        })
    }

    pub fn with_test_network(mut self, net: Box<dyn ScoringNetwork + 'a>) -> Self {
        self.test_nets.push(net);
        self
    }

    pub fn with_action_signal(mut self, actions: ActionSignal) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_progress(mut self, reporter: ProgressReporter<'a>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn iter(&self) -> usize {
        self.iter
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn smoothed_loss(&self) -> f32 {
        self.smoothed_loss.value()
    }

    pub fn requested_early_exit(&self) -> bool {
        self.requested_early_exit
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn into_network(self) -> N {
        self.net
    }

    pub fn input(&self) -> Option<&Tensor> {
        self.net.tensors().get(self.input)
    }

    pub fn history(&self) -> &Tensor {
        &self.history
    }

    /// The step subtracted from the input by the most recent update.
    pub fn last_update(&self) -> &[f32] {
        self.update.data()
    }

    /// State files written so far, oldest first.
    pub fn snapshots(&self) -> &[PathBuf] {
        &self.snapshots
    }

    /// Runs until `max_iter`, optionally resuming from a saved state first.
    pub fn solve(&mut self, resume: Option<&Path>) -> Result<(), SolverError> {
        info!(
            "Solving input optimization (max_iter = {}, lr_policy = {})",
            self.config.max_iter, self.config.learning_rate.policy
        );
        self.requested_early_exit = false;

        if let Some(path) = resume {
            info!("Restoring previous solver status from {}", path.display());
            self.restore(path)?;
        }

        let start_iter = self.iter;
        let remaining = self.config.max_iter.saturating_sub(self.iter);
        self.reporter.report(Progress::RunStart {
            total_iterations: remaining as u64,
        });
        self.step(remaining)?;

        let interval = self.config.snapshot.interval;
        if self.config.snapshot.after_train && (interval == 0 || self.iter % interval != 0) {
            self.snapshot()?;
        }

        if self.requested_early_exit {
            info!("Optimization stopped early.");
            self.reporter.report(Progress::RunFinish);
            return Ok(());
        }

        let display = self.config.display;
        if display > 0 && self.iter % display == 0 {
            let loss = self.net.forward_from(1)?;
            self.smoothed_loss.update(loss, self.iter, start_iter);
            info!(
                "Iteration {}, loss = {}",
                self.iter,
                self.smoothed_loss.value()
            );
        }

        let test_interval = self.config.test.interval;
        if test_interval > 0 && self.iter % test_interval == 0 {
            self.test_all()?;
        }

        info!("Optimization done.");
        self.reporter.report(Progress::RunFinish);
        Ok(())
    }

    /// Runs `iters` iterations, or fewer if a stop is requested.
    pub fn step(&mut self, iters: usize) -> Result<(), SolverError> {
        let start_iter = self.iter;
        let stop_iter = self.iter + iters;
        self.smoothed_loss.reset();
        self.iteration_timer = Instant::now();
        self.iterations_last = self.iter;

        // Layer 0 produces the input; after priming it once, every pass starts at layer 1.
        if self.iter == 0 {
            self.net.forward_from_to(0, 0)?;
        }

        while self.iter < stop_iter {
            self.net.clear_param_diffs();
            self.net
                .tensors_mut()
                .get_mut(self.input)
                .ok_or_else(missing_input)?
                .zero_diff();

            let test = &self.config.test;
            if test.interval > 0
                && self.iter % test.interval == 0
                && (self.iter > 0 || test.initialization)
            {
                self.test_all()?;
                if self.requested_early_exit {
                    break;
                }
            }

            let display = self.config.display > 0 && self.iter % self.config.display == 0;
            self.net.set_debug_info(display && self.config.debug_info);

            let mut loss = 0.0;
            for _ in 0..self.config.iter_size {
                loss += self.net.forward_from(1)?;
                let toggled = self.toggle_max_to_average();
                let backward = self.net.backward();
                if let Some(index) = toggled {
                    self.restore_max_pooling(index);
                }
                backward?;
            }
            loss /= self.config.iter_size as f32;

            self.smoothed_loss.update(loss, self.iter, start_iter);
            if display {
                self.display_train_outputs();
            }

            self.apply_update()?;
            self.iter += 1;
            self.reporter.report(Progress::IterationFinish {
                iteration: self.iter as u64,
                loss,
            });

            let request = self.actions.take();
            let interval = self.config.snapshot.interval;
            if interval > 0 && self.iter % interval == 0 {
                self.snapshot()?;
            } else if request.snapshot {
                self.requested_snapshot()?;
            }
            if request.stop {
                self.requested_early_exit = true;
                break;
            }
        }
        Ok(())
    }

    /// Switches the first pooling layer from max to average pooling.
    ///
    /// The search starts after the input layer and gives up at the first
    /// convolution or inner-product layer. Returns the index of the layer that
    /// was switched, which must be set back to max pooling after backward.
    fn toggle_max_to_average(&mut self) -> Option<usize> {
        for index in 1..self.net.num_layers() {
            let layer = self.net.layer_mut(index)?;
            if let Some(pool) = layer.as_pooling_mut() {
                if pool.pooling_method() == PoolingMethod::Max {
                    pool.set_pooling_method(PoolingMethod::Average);
                    return Some(index);
                }
                return None;
            }
            if layer.kind().is_dense_transform() {
                return None;
            }
        }
        None
    }

    fn restore_max_pooling(&mut self, index: usize) {
        if let Some(pool) = self
            .net
            .layer_mut(index)
            .and_then(|layer| layer.as_pooling_mut())
        {
            pool.set_pooling_method(PoolingMethod::Max);
        }
    }

    fn display_train_outputs(&mut self) {
        let lapse = self.iteration_timer.elapsed().as_secs_f32();
        let per_s = (self.iter - self.iterations_last) as f32 / if lapse > 0.0 { lapse } else { 1.0 };
        info!(
            "Iteration {} ({} iter/s, {}s/{} iters), loss = {}",
            self.iter,
            per_s,
            lapse,
            self.config.display,
            self.smoothed_loss.value()
        );
        self.iteration_timer = Instant::now();
        self.iterations_last = self.iter;

        let mut score_index = 0;
        for output in self.net.outputs() {
            for value in &output.values {
                info!(
                    "    Train net output #{}: {} = {}{}",
                    score_index,
                    output.name,
                    value,
                    loss_suffix(output.loss_weight, *value)
                );
                score_index += 1;
            }
        }
    }

    fn apply_update(&mut self) -> Result<(), SolverError> {
        let rate = learning_rate(
            &self.config.learning_rate,
            self.config.max_iter,
            self.iter,
            &mut self.current_step,
        );
        if self.config.display > 0 && self.iter % self.config.display == 0 {
            info!("Iteration {}, lr = {}", self.iter, rate);
        }

        // The gradient accumulated over `iter_size` passes is applied as is,
        // without the 1/iter_size normalization of weight training.
        self.clip_gradients()?;
        self.compute_update_value(rate)?;
        self.net
            .tensors_mut()
            .get_mut(self.input)
            .ok_or_else(missing_input)?
            .update();
        if self.config.threshold_update {
            self.threshold_input()?;
        }
        Ok(())
    }

    /// Scales the input gradient down so its L2 norm does not exceed the
    /// configured ceiling. A negative ceiling disables clipping.
    pub fn clip_gradients(&mut self) -> Result<(), SolverError> {
        let ceiling = self.config.clip_gradients;
        if ceiling < 0.0 {
            return Ok(());
        }
        let input = self
            .net
            .tensors_mut()
            .get_mut(self.input)
            .ok_or_else(missing_input)?;
        let l2norm = self.backend.sum_of_squares(input.diff()).sqrt();
        if l2norm > ceiling {
            let scale_factor = ceiling / l2norm;
            info!(
                "Gradient clipping: scaling down gradients (L2 norm {} > {}) by scale factor {}",
                l2norm, ceiling, scale_factor
            );
            self.backend.scale(input.diff_mut(), scale_factor as f32);
        }
        Ok(())
    }

    fn compute_update_value(&mut self, rate: f64) -> Result<(), SolverError> {
        let input = self
            .net
            .tensors_mut()
            .get_mut(self.input)
            .ok_or_else(missing_input)?;
        if input.count() != self.history.count() {
            return Err(SolverError::Internal(format!(
                "input tensor holds {} values but the momentum history holds {}",
                input.count(),
                self.history.count()
            )));
        }
        self.backend.momentum_update(
            input.diff_mut(),
            self.history.data_mut(),
            self.config.momentum as f32,
            rate as f32,
        );
        self.update.data_mut().copy_from_slice(input.diff());
        Ok(())
    }

    /// Clamps negative input values to zero outside the protected
    /// receptor/ligand channel prefix.
    pub fn threshold_input(&mut self) -> Result<(), SolverError> {
        let protected = self.config.grid.protected_len();
        let input = self
            .net
            .tensors_mut()
            .get_mut(self.input)
            .ok_or_else(missing_input)?;
        if protected < input.count() {
            self.backend.clamp_negative(&mut input.data_mut()[protected..]);
        }
        Ok(())
    }

    fn test_all(&mut self) -> Result<(), SolverError> {
        for index in 0..self.test_nets.len() {
            if self.requested_early_exit {
                break;
            }
            self.test(index)?;
        }
        Ok(())
    }

    fn test(&mut self, index: usize) -> Result<(), SolverError> {
        let test_iter = self.config.test.iterations;
        if test_iter == 0 {
            return Ok(());
        }
        info!("Iteration {}, Testing net (#{})", self.iter, index);

        let mut scores: Vec<f32> = Vec::new();
        let mut loss = 0.0;
        for _ in 0..test_iter {
            let request = self.actions.take();
            if request.snapshot {
                self.requested_snapshot()?;
            }
            if request.stop {
                self.requested_early_exit = true;
            }
            if self.requested_early_exit {
                break;
            }

            let net = &mut self.test_nets[index];
            loss += net.forward()?;
            let values = net.outputs().into_iter().flat_map(|output| output.values);
            if scores.is_empty() {
                scores.extend(values);
            } else {
                for (score, value) in scores.iter_mut().zip(values) {
                    *score += value;
                }
            }
        }

        if self.requested_early_exit {
            info!("Test interrupted.");
            return Ok(());
        }

        debug!("Test loss: {}", loss / test_iter as f32);
        let outputs = self.test_nets[index].outputs();
        let labels = outputs
            .iter()
            .flat_map(|output| output.values.iter().map(move |_| output));
        for (score_index, (output, score)) in labels.zip(&scores).enumerate() {
            let mean_score = score / test_iter as f32;
            info!(
                "    Test net output #{}: {} = {}{}",
                score_index,
                output.name,
                mean_score,
                loss_suffix(output.loss_weight, mean_score)
            );
        }
        Ok(())
    }

    /// Writes the model file and the solver state for the current iteration.
    ///
    /// # Return
    ///
    /// The path of the solver-state file.
    pub fn snapshot(&mut self) -> Result<PathBuf, SolverError> {
        let format = self.config.snapshot.format;
        let model_path = self.snapshot_filename(format.weights_extension());
        let state_path = self.snapshot_filename(format.state_extension());

        if let Some(parent) = state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!("Snapshotting to {}", model_path.display());
        self.net.write_weights(&model_path)?;

        let input = self.input().ok_or_else(missing_input)?;
        let state = SolverState {
            iter: self.iter,
            learned_net: model_path.to_string_lossy().into_owned(),
            current_step: self.current_step,
            history: vec![TensorRecord::from_tensor(&self.history)],
            input: TensorRecord::from_tensor(input),
        };
        info!(
            ?format,
            "Snapshotting solver state to {}",
            state_path.display()
        );
        state.save(&state_path, format)?;

        self.reporter.report(Progress::Snapshot {
            path: state_path.clone(),
        });
        self.snapshots.push(state_path.clone());
        Ok(state_path)
    }

    /// Snapshot on external request; skipped with a warning when no prefix
    /// is configured, so nothing lands in the working directory by accident.
    fn requested_snapshot(&mut self) -> Result<Option<PathBuf>, SolverError> {
        if self.config.snapshot.prefix.as_os_str().is_empty() {
            warn!(
                iteration = self.iter,
                "Snapshot requested but no snapshot prefix is configured; ignoring."
            );
            return Ok(None);
        }
        self.snapshot().map(Some)
    }

    fn snapshot_filename(&self, extension: &str) -> PathBuf {
        let mut name = self.config.snapshot.prefix.clone().into_os_string();
        name.push(format!("_iter_{}{}", self.iter, extension));
        PathBuf::from(name)
    }

    /// Loads iteration count, schedule step, momentum history and input values.
    pub fn restore(&mut self, path: &Path) -> Result<(), SolverError> {
        let state = SolverState::load(path)?;

        let [history] = <[TensorRecord; 1]>::try_from(state.history).map_err(|h| {
            CheckpointError::Format {
                path: path.to_path_buf(),
                message: format!("expected 1 momentum history tensor, found {}", h.len()),
            }
        })?;
        if history.shape != self.history.shape() {
            return Err(CheckpointError::ShapeMismatch {
                name: "history".to_string(),
                expected: self.history.shape().to_vec(),
                actual: history.shape,
            }
            .into());
        }

        let input = self
            .net
            .tensors_mut()
            .get_mut(self.input)
            .ok_or_else(missing_input)?;
        if state.input.shape != input.shape() {
            return Err(CheckpointError::ShapeMismatch {
                name: INPUT_TENSOR_NAME.to_string(),
                expected: input.shape().to_vec(),
                actual: state.input.shape,
            }
            .into());
        }
        input
            .set_data(&state.input.data)
            .map_err(|e| SolverError::Internal(e.to_string()))?;
        self.history
            .set_data(&history.data)
            .map_err(|e| SolverError::Internal(e.to_string()))?;

        self.iter = state.iter;
        self.current_step = state.current_step;
        info!(
            iteration = self.iter,
            current_step = self.current_step,
            model = %state.learned_net,
            "Restored solver state."
        );
        Ok(())
    }
}

fn loss_suffix(loss_weight: f32, value: f32) -> String {
    if loss_weight != 0.0 {
        format!(" (* {} = {} loss)", loss_weight, loss_weight * value)
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::SolverAction;
    use crate::engine::config::{
        ExecutionMode, GridLayout, LearningRatePolicy, SnapshotFormat, SolverConfigBuilder,
    };
    use crate::engine::error::NetworkError;
    use crate::engine::network::{Layer, NetOutput, PoolingControl};
    use crate::engine::tensor::TensorStore;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        ForwardFromTo(usize, usize),
        Backward(Vec<Option<PoolingMethod>>),
        ClearParamDiffs,
    }

    struct MockLayer {
        type_name: &'static str,
        pooling: Option<PoolingMethod>,
    }

    impl MockLayer {
        fn plain(type_name: &'static str) -> Self {
            Self {
                type_name,
                pooling: None,
            }
        }

        fn max_pool() -> Self {
            Self {
                type_name: "Pooling",
                pooling: Some(PoolingMethod::Max),
            }
        }
    }

    impl PoolingControl for MockLayer {
        fn pooling_method(&self) -> PoolingMethod {
            self.pooling.unwrap_or(PoolingMethod::Max)
        }

        fn set_pooling_method(&mut self, method: PoolingMethod) {
            self.pooling = Some(method);
        }
    }

    impl Layer for MockLayer {
        fn type_name(&self) -> &str {
            self.type_name
        }

        fn as_pooling_mut(&mut self) -> Option<&mut dyn PoolingControl> {
            if self.pooling.is_some() {
                Some(self)
            } else {
                None
            }
        }
    }

    /// Writes a fixed gradient into `data` on every backward pass and records calls.
    struct RecordingNetwork {
        tensors: TensorStore,
        layers: Vec<MockLayer>,
        gradient: Vec<f32>,
        calls: Arc<Mutex<Vec<Call>>>,
        on_backward: Option<Box<dyn FnMut(usize)>>,
        backward_count: usize,
    }

    impl RecordingNetwork {
        fn new(initial: Vec<f32>, gradient: Vec<f32>, layers: Vec<MockLayer>) -> Self {
            let mut tensors = TensorStore::new();
            let len = initial.len();
            tensors.insert("data", Tensor::from_data(vec![len], initial).unwrap());
            tensors.insert("loss", Tensor::zeros(vec![1]));
            Self {
                tensors,
                layers,
                gradient,
                calls: Arc::new(Mutex::new(Vec::new())),
                on_backward: None,
                backward_count: 0,
            }
        }

        fn standard(initial: Vec<f32>, gradient: Vec<f32>) -> Self {
            Self::new(
                initial,
                gradient,
                vec![
                    MockLayer::plain("Input"),
                    MockLayer::max_pool(),
                    MockLayer::plain("Convolution"),
                    MockLayer::max_pool(),
                    MockLayer::plain("EuclideanLoss"),
                ],
            )
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn pooling_methods(&self) -> Vec<Option<PoolingMethod>> {
            self.layers.iter().map(|l| l.pooling).collect()
        }
    }

    impl ScoringNetwork for RecordingNetwork {
        fn tensors(&self) -> &TensorStore {
            &self.tensors
        }

        fn tensors_mut(&mut self) -> &mut TensorStore {
            &mut self.tensors
        }

        fn num_layers(&self) -> usize {
            self.layers.len()
        }

        fn layer(&self, index: usize) -> Option<&dyn Layer> {
            self.layers.get(index).map(|l| l as &dyn Layer)
        }

        fn layer_mut(&mut self, index: usize) -> Option<&mut dyn Layer> {
            self.layers.get_mut(index).map(|l| l as &mut dyn Layer)
        }

        fn forward_from_to(&mut self, start: usize, end: usize) -> Result<f32, NetworkError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::ForwardFromTo(start, end));
            Ok(1.0)
        }

        fn backward(&mut self) -> Result<(), NetworkError> {
            let methods = self.pooling_methods();
            self.calls.lock().unwrap().push(Call::Backward(methods));
            let id = self.tensors.id("data").unwrap();
            let data = self.tensors.get_mut(id).unwrap();
            for (d, g) in data.diff_mut().iter_mut().zip(&self.gradient) {
                *d += *g;
            }
            self.backward_count += 1;
            if let Some(hook) = self.on_backward.as_mut() {
                hook(self.backward_count);
            }
            Ok(())
        }

        fn clear_param_diffs(&mut self) {
            self.calls.lock().unwrap().push(Call::ClearParamDiffs);
        }

        fn outputs(&self) -> Vec<NetOutput> {
            vec![NetOutput {
                name: "loss".to_string(),
                values: vec![1.0],
                loss_weight: 1.0,
            }]
        }
    }

    fn base_config() -> SolverConfigBuilder {
        SolverConfigBuilder::new()
            .base_lr(0.01)
            .lr_policy(LearningRatePolicy::Fixed)
            .momentum(0.9)
            .max_iter(10)
            .snapshot_after_train(false)
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{} != {}", a, e);
        }
    }

    #[test]
    fn new_fails_without_data_tensor() {
        let mut net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
        net.tensors = TensorStore::new();
        net.tensors.insert("input", Tensor::zeros(vec![4]));
        let err = InputOptSolver::new(base_config().build().unwrap(), net)
            .err()
            .unwrap();
        assert!(matches!(err, SolverError::MissingInputTensor(name) if name == "data"));
    }

    #[test]
    fn new_fails_when_backend_is_unavailable() {
        let net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
        let config = base_config()
            .execution_mode(ExecutionMode::Accelerator)
            .build()
            .unwrap();
        assert!(matches!(
            InputOptSolver::new(config, net),
            Err(SolverError::BackendUnavailable(ExecutionMode::Accelerator))
        ));
    }

    #[test]
    fn single_step_primes_input_then_applies_momentum_update() {
        let initial = vec![1.0, 2.0, 3.0, 4.0];
        let gradient = vec![0.5, -1.0, 2.0, 0.0];
        let net = RecordingNetwork::standard(initial.clone(), gradient.clone());
        let mut solver = InputOptSolver::new(base_config().build().unwrap(), net).unwrap();

        solver.step(1).unwrap();

        assert_eq!(solver.iter(), 1);
        let calls = solver.network().calls();
        assert_eq!(calls[0], Call::ForwardFromTo(0, 0));
        assert_eq!(calls[1], Call::ClearParamDiffs);
        assert_eq!(calls[2], Call::ForwardFromTo(1, 4));
        assert!(matches!(calls[3], Call::Backward(_)));
        assert_eq!(calls.len(), 4);

        let step: Vec<f32> = gradient.iter().map(|g| 0.01 * g).collect();
        assert_close(solver.history().data(), &step);
        assert_close(solver.last_update(), &step);
        let expected: Vec<f32> = initial.iter().zip(&step).map(|(v, s)| v - s).collect();
        assert_close(solver.input().unwrap().data(), &expected);
    }

    #[test]
    fn second_step_accumulates_momentum_without_repriming() {
        let gradient = vec![1.0, -1.0, 0.5, 2.0];
        let net = RecordingNetwork::standard(vec![0.0; 4], gradient.clone());
        let mut solver = InputOptSolver::new(base_config().build().unwrap(), net).unwrap();

        solver.step(1).unwrap();
        solver.step(1).unwrap();

        assert_eq!(solver.iter(), 2);
        let primes = solver
            .network()
            .calls()
            .iter()
            .filter(|c| **c == Call::ForwardFromTo(0, 0))
            .count();
        assert_eq!(primes, 1);

        let history: Vec<f32> = gradient.iter().map(|g| 0.9 * 0.01 * g + 0.01 * g).collect();
        assert_close(solver.history().data(), &history);
        let total: Vec<f32> = gradient
            .iter()
            .zip(&history)
            .map(|(g, h)| -(0.01 * g) - h)
            .collect();
        assert_close(solver.input().unwrap().data(), &total);
    }

    #[test]
    fn first_pooling_layer_is_averaged_only_during_backward() {
        let net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
        let mut solver = InputOptSolver::new(base_config().build().unwrap(), net).unwrap();
        solver.step(2).unwrap();

        for call in solver.network().calls() {
            if let Call::Backward(methods) = call {
                assert_eq!(methods[1], Some(PoolingMethod::Average));
                assert_eq!(methods[3], Some(PoolingMethod::Max));
            }
        }
        assert_eq!(
            solver.network().pooling_methods(),
            vec![
                None,
                Some(PoolingMethod::Max),
                None,
                Some(PoolingMethod::Max),
                None
            ]
        );
    }

    #[test]
    fn pooling_after_convolution_is_never_toggled() {
        let net = RecordingNetwork::new(
            vec![0.0; 2],
            vec![0.0; 2],
            vec![
                MockLayer::plain("Input"),
                MockLayer::plain("Convolution"),
                MockLayer::max_pool(),
            ],
        );
        let mut solver = InputOptSolver::new(base_config().build().unwrap(), net).unwrap();
        solver.step(1).unwrap();
        let backward = solver
            .network()
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Backward(methods) => Some(methods),
                _ => None,
            })
            .unwrap();
        assert_eq!(backward[2], Some(PoolingMethod::Max));
    }

    #[test]
    fn average_pooling_layer_is_left_untouched() {
        let mut average = MockLayer::max_pool();
        average.pooling = Some(PoolingMethod::Average);
        let net = RecordingNetwork::new(
            vec![0.0; 2],
            vec![0.0; 2],
            vec![MockLayer::plain("Input"), average],
        );
        let mut solver = InputOptSolver::new(base_config().build().unwrap(), net).unwrap();
        solver.step(1).unwrap();
        assert_eq!(
            solver.network().pooling_methods()[1],
            Some(PoolingMethod::Average)
        );
    }

    #[test]
    fn clipping_scales_gradient_norm_down_to_ceiling() {
        let net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
        let config = base_config().clip_gradients(1.0).build().unwrap();
        let mut solver = InputOptSolver::new(config, net).unwrap();
        let diff = [3.0, 0.0, -4.0, 0.0];
        let id = solver.network().tensors.id("data").unwrap();
        solver.network_mut().tensors.get_mut(id).unwrap().diff_mut().copy_from_slice(&diff);

        solver.clip_gradients().unwrap();

        let clipped = solver.input().unwrap().diff().to_vec();
        let norm = clipped.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert_close(&clipped, &[0.6, 0.0, -0.8, 0.0]);
    }

    #[test]
    fn clipping_never_scales_small_gradients_up_and_negative_ceiling_disables_it() {
        for ceiling in [10.0, -1.0] {
            let net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
            let config = base_config().clip_gradients(ceiling).build().unwrap();
            let mut solver = InputOptSolver::new(config, net).unwrap();
            let id = solver.network().tensors.id("data").unwrap();
            let diff = [30.0, 0.0, -40.0, 0.0];
            solver.network_mut().tensors.get_mut(id).unwrap().diff_mut().copy_from_slice(&diff);
            solver.clip_gradients().unwrap();
            let expected = if ceiling < 0.0 { diff } else { [6.0, 0.0, -8.0, 0.0] };
            assert_close(solver.input().unwrap().diff(), &expected);
        }
    }

    #[test]
    fn thresholding_clamps_only_values_past_protected_prefix() {
        let initial = vec![-1.0, -2.0, 3.0, -4.0, 5.0, -0.5, 0.0, -7.0];
        let net = RecordingNetwork::standard(initial.clone(), vec![0.0; 8]);
        let config = base_config()
            .threshold_update(true)
            .grid(GridLayout {
                receptor_channels: 1,
                ligand_channels: 1,
                grid_points: 2,
            })
            .build()
            .unwrap();
        let mut solver = InputOptSolver::new(config, net).unwrap();

        solver.threshold_input().unwrap();

        let data = solver.input().unwrap().data();
        assert_eq!(&data[..4], &initial[..4]);
        assert_eq!(&data[4..], &[5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn stop_request_during_third_iteration_ends_after_it() {
        let signal = ActionSignal::new();
        let remote = signal.clone();
        let mut net = RecordingNetwork::standard(vec![0.0; 4], vec![1.0; 4]);
        net.on_backward = Some(Box::new(move |count| {
            if count == 3 {
                remote.request(SolverAction::Stop);
            }
        }));
        let mut solver = InputOptSolver::new(base_config().build().unwrap(), net)
            .unwrap()
            .with_action_signal(signal);

        solver.solve(None).unwrap();

        assert_eq!(solver.iter(), 3);
        assert!(solver.requested_early_exit());
        assert_eq!(solver.network().backward_count, 3);
    }

    #[test]
    fn periodic_snapshot_captures_live_input_exactly() {
        for format in [SnapshotFormat::Binary, SnapshotFormat::Structured] {
            let dir = tempdir().unwrap();
            let net = RecordingNetwork::standard(vec![0.3, -0.1, 0.7, 1.1], vec![0.13, 0.2, -0.7, 0.05]);
            let config = base_config()
                .max_iter(5)
                .snapshot(5)
                .snapshot_prefix(dir.path().join("run").join("opt"))
                .snapshot_format(format)
                .snapshot_after_train(true)
                .build()
                .unwrap();
            let mut solver = InputOptSolver::new(config, net).unwrap();
            solver.solve(None).unwrap();

            assert_eq!(solver.snapshots().len(), 1);
            let path = &solver.snapshots()[0];
            assert!(path.to_string_lossy().ends_with(format.state_extension()));
            assert!(path.to_string_lossy().contains("opt_iter_5"));

            let state = SolverState::load(path).unwrap();
            assert_eq!(state.iter, 5);
            let live = solver.input().unwrap().data();
            let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(state.input.data.as_slice()), bits(live));
            assert_eq!(state.history[0].data, solver.history().data());
        }
    }

    #[test]
    fn snapshot_request_writes_state_without_stopping() {
        let dir = tempdir().unwrap();
        let signal = ActionSignal::new();
        let remote = signal.clone();
        let mut net = RecordingNetwork::standard(vec![0.0; 4], vec![1.0; 4]);
        net.on_backward = Some(Box::new(move |count| {
            if count == 2 {
                remote.request(SolverAction::Snapshot);
            }
        }));
        let config = base_config()
            .max_iter(4)
            .snapshot_prefix(dir.path().join("opt"))
            .build()
            .unwrap();
        let mut solver = InputOptSolver::new(config, net)
            .unwrap()
            .with_action_signal(signal);
        solver.solve(None).unwrap();

        assert_eq!(solver.iter(), 4);
        assert_eq!(solver.snapshots().len(), 1);
        assert_eq!(SolverState::load(&solver.snapshots()[0]).unwrap().iter, 2);
    }

    #[test]
    fn stop_and_snapshot_in_same_iteration_writes_snapshot_then_stops() {
        let dir = tempdir().unwrap();
        let signal = ActionSignal::new();
        let remote = signal.clone();
        let mut net = RecordingNetwork::standard(vec![0.0; 4], vec![1.0; 4]);
        net.on_backward = Some(Box::new(move |count| {
            if count == 2 {
                remote.request(SolverAction::Stop);
                remote.request(SolverAction::Snapshot);
            }
        }));
        let config = base_config()
            .max_iter(6)
            .snapshot_prefix(dir.path().join("opt"))
            .build()
            .unwrap();
        let mut solver = InputOptSolver::new(config, net)
            .unwrap()
            .with_action_signal(signal);
        solver.solve(None).unwrap();

        assert_eq!(solver.iter(), 2);
        assert!(solver.requested_early_exit());
        assert_eq!(solver.snapshots().len(), 1);
        assert_eq!(SolverState::load(&solver.snapshots()[0]).unwrap().iter, 2);
    }

    #[test]
    fn snapshot_request_without_prefix_is_ignored() {
        let signal = ActionSignal::new();
        let remote = signal.clone();
        let mut net = RecordingNetwork::standard(vec![0.0; 4], vec![1.0; 4]);
        net.on_backward = Some(Box::new(move |count| {
            if count == 1 {
                remote.request(SolverAction::Snapshot);
            }
        }));
        let config = base_config().max_iter(3).build().unwrap();
        assert!(config.snapshot.prefix.as_os_str().is_empty());
        let mut solver = InputOptSolver::new(config, net)
            .unwrap()
            .with_action_signal(signal);

        solver.solve(None).unwrap();

        assert_eq!(solver.iter(), 3);
        assert!(solver.snapshots().is_empty());
        let stray = format!("_iter_1{}", SnapshotFormat::default().state_extension());
        assert!(!Path::new(&stray).exists());
    }

    #[test]
    fn accumulated_gradient_is_not_divided_by_iter_size() {
        let net = RecordingNetwork::standard(vec![0.0; 4], vec![-1.0; 4]);
        let config = SolverConfigBuilder::new()
            .base_lr(0.1)
            .lr_policy(LearningRatePolicy::Fixed)
            .momentum(0.0)
            .iter_size(2)
            .max_iter(1)
            .snapshot_after_train(false)
            .build()
            .unwrap();
        let mut solver = InputOptSolver::new(config, net).unwrap();

        solver.step(1).unwrap();

        assert_eq!(solver.network().backward_count, 2);
        assert_close(solver.history().data(), &[-0.2; 4]);
        assert_close(solver.input().unwrap().data(), &[0.2; 4]);
    }

    #[test]
    fn restore_resumes_iteration_history_and_input() {
        let dir = tempdir().unwrap();
        let config = base_config()
            .max_iter(3)
            .snapshot_prefix(dir.path().join("opt"))
            .snapshot_after_train(true)
            .build()
            .unwrap();

        let net = RecordingNetwork::standard(vec![1.0; 4], vec![0.5, 0.25, -0.5, 1.0]);
        let mut first = InputOptSolver::new(config.clone(), net).unwrap();
        first.solve(None).unwrap();
        let saved = first.snapshots()[0].clone();

        let net = RecordingNetwork::standard(vec![0.0; 4], vec![0.5, 0.25, -0.5, 1.0]);
        let mut second = InputOptSolver::new(config, net).unwrap();
        second.restore(&saved).unwrap();

        assert_eq!(second.iter(), 3);
        assert_eq!(second.history().data(), first.history().data());
        assert_eq!(
            second.input().unwrap().data(),
            first.input().unwrap().data()
        );
    }

    #[test]
    fn restore_rejects_mismatched_input_shape() {
        let dir = tempdir().unwrap();
        let config = base_config()
            .max_iter(1)
            .snapshot_prefix(dir.path().join("opt"))
            .snapshot_after_train(true)
            .build()
            .unwrap();
        let mut small =
            InputOptSolver::new(config.clone(), RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]))
                .unwrap();
        small.solve(None).unwrap();

        let mut large =
            InputOptSolver::new(config, RecordingNetwork::standard(vec![0.0; 6], vec![0.0; 6]))
                .unwrap();
        let err = large.restore(&small.snapshots()[0]).unwrap_err();
        assert!(matches!(
            err,
            SolverError::Checkpoint {
                source: CheckpointError::ShapeMismatch { .. }
            }
        ));
    }

    #[test]
    fn held_out_evaluation_runs_at_test_interval() {
        let test_net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
        let test_calls = test_net.calls.clone();
        let config = base_config()
            .max_iter(4)
            .test_interval(2)
            .test_iter(3)
            .build()
            .unwrap();
        let net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
        let mut solver = InputOptSolver::new(config, net)
            .unwrap()
            .with_test_network(Box::new(test_net));
        solver.solve(None).unwrap();

        let forwards = test_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == Call::ForwardFromTo(0, 4))
            .count();
        // iterations 0, 2 and the final evaluation at 4, three passes each
        assert_eq!(forwards, 9);
    }

    #[test]
    fn iteration_events_are_reported_with_loss() {
        let seen = Mutex::new(Vec::new());
        let net = RecordingNetwork::standard(vec![0.0; 4], vec![0.0; 4]);
        let config = base_config().max_iter(2).build().unwrap();
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::IterationFinish { iteration, loss } = event {
                seen.lock().unwrap().push((iteration, loss));
            }
        }));
        let mut solver = InputOptSolver::new(config, net)
            .unwrap()
            .with_progress(reporter);
        solver.solve(None).unwrap();
        drop(solver);
        assert_eq!(seen.into_inner().unwrap(), vec![(1, 1.0), (2, 1.0)]);
    }
}
