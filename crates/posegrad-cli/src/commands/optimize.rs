use crate::cli::OptimizeArgs;
use crate::config::{self, AppConfig};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use posegrad::engine::action::{ActionSignal, SolverAction};
use posegrad::engine::checkpoint::TensorRecord;
use posegrad::engine::progress::ProgressReporter;
use posegrad::engine::reference::TargetDensityNetwork;
use posegrad::engine::tensor::Tensor;
use posegrad::workflows::{self, optimize::OptimizeResult};
use std::future::Future;
use std::io;
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

pub fn run(args: OptimizeArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app_config = config::build_config(&args)?;

    let actions = ActionSignal::new();
    install_interrupt_handler(actions.clone())?;

    let result = optimize(&app_config, actions)?;
    report(&result);

    if let Some(output_path) = &app_config.output_path {
        info!("Writing optimized grid to {:?}", output_path);
        result.input.save_toml(output_path)?;
        println!("✓ Optimized grid written to: {}", output_path.display());
    }

    Ok(())
}

fn optimize(app_config: &AppConfig, actions: ActionSignal) -> Result<OptimizeResult> {
    let network = load_network(app_config)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting input optimization...");
    info!("Invoking the core optimization workflow...");
    Ok(workflows::optimize::run(
        network,
        &app_config.solver,
        app_config.resume_path.as_deref(),
        Some(actions),
        &reporter,
    )?)
}

/// Turns the first Ctrl-C into a stop request; a second one aborts the process.
fn install_interrupt_handler(actions: ActionSignal) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("posegrad-interrupt".to_string())
        .spawn(move || runtime.block_on(relay_interrupts(tokio::signal::ctrl_c, actions)))?;
    debug!("Ctrl-C handler installed.");
    Ok(())
}

async fn relay_interrupts<F, Fut>(mut next_interrupt: F, actions: ActionSignal)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        return;
    }
    warn!("Interrupt received; stopping after the current iteration. Press Ctrl-C again to abort.");
    eprintln!("\nInterrupted: finishing the current iteration (Ctrl-C again to abort).");
    actions.request(SolverAction::Stop);

    if next_interrupt().await.is_ok() {
        std::process::exit(130);
    }
}

fn load_network(app_config: &AppConfig) -> Result<TargetDensityNetwork> {
    info!("Loading target grid from {:?}", &app_config.target_path);
    let target = load_grid(&app_config.target_path)?;

    match &app_config.init_path {
        Some(init_path) => {
            info!("Loading starting grid from {:?}", init_path);
            let initial = load_grid(init_path)?;
            Ok(TargetDensityNetwork::new(initial, target)?)
        }
        None => Ok(TargetDensityNetwork::from_target(target)),
    }
}

fn load_grid(path: &Path) -> Result<Tensor> {
    TensorRecord::load_toml(path)?
        .into_tensor()
        .map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
}

fn report(result: &OptimizeResult) {
    info!(
        "Workflow finished after {} iteration(s).",
        result.iterations
    );
    if result.stopped_early {
        warn!("Optimization stopped before reaching max_iter.");
        println!(
            "Warning: optimization stopped early at iteration {}.",
            result.iterations
        );
    }
    println!(
        "Workflow complete: {} iteration(s), smoothed loss {:.6e}.",
        result.iterations, result.smoothed_loss
    );
    for path in &result.snapshots {
        println!("  Snapshot: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_grid(path: &Path, shape: Vec<usize>, data: Vec<f32>) {
        TensorRecord { shape, data }.save_toml(path).unwrap();
    }

    fn args(target: PathBuf) -> OptimizeArgs {
        OptimizeArgs {
            target,
            init: None,
            output: None,
            config: None,
            resume: None,
            max_iter: Some(300),
            base_lr: Some(0.1),
            snapshot_prefix: None,
            threshold: false,
            set_values: vec![],
        }
    }

    #[test]
    fn optimize_writes_grid_close_to_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.toml");
        let output = dir.path().join("optimized.toml");
        write_grid(&target, vec![1, 3], vec![0.5, 1.5, -1.0]);

        let mut args = args(target);
        args.output = Some(output.clone());
        run(args).unwrap();

        let record = TensorRecord::load_toml(&output).unwrap();
        assert_eq!(record.shape, vec![1, 3]);
        for (value, goal) in record.data.iter().zip([0.5, 1.5, -1.0]) {
            assert!((value - goal).abs() < 1e-3, "{} vs {}", value, goal);
        }
    }

    #[test]
    fn thresholding_keeps_unprotected_cells_non_negative() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.toml");
        let output = dir.path().join("optimized.toml");
        write_grid(&target, vec![2, 2], vec![-1.0, -1.0, -1.0, 2.0]);
        let config = dir.path().join("solver.toml");
        std::fs::write(
            &config,
            "[threshold]\nenabled = true\nreceptor-channels = 1\nligand-channels = 0\ngrid-points = 2\n",
        )
        .unwrap();

        let mut args = args(target);
        args.output = Some(output.clone());
        args.config = Some(config);
        run(args).unwrap();

        let data = TensorRecord::load_toml(&output).unwrap().data;
        assert!((data[0] + 1.0).abs() < 1e-3);
        assert!((data[1] + 1.0).abs() < 1e-3);
        assert_eq!(data[2], 0.0);
        assert!((data[3] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn pending_stop_request_ends_optimization_after_one_iteration() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.toml");
        write_grid(&target, vec![1, 3], vec![0.5, 1.5, -1.0]);
        let app_config = config::build_config(&args(target)).unwrap();

        let actions = ActionSignal::new();
        actions.request(SolverAction::Stop);
        let result = optimize(&app_config, actions).unwrap();

        assert!(result.stopped_early);
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test]
    async fn first_interrupt_requests_stop() {
        let actions = ActionSignal::new();
        let mut calls = 0;
        let next_interrupt = || {
            calls += 1;
            std::future::ready(if calls == 1 {
                Ok(())
            } else {
                Err(io::Error::other("listener closed"))
            })
        };

        relay_interrupts(next_interrupt, actions.clone()).await;

        let pending = actions.take();
        assert!(pending.stop);
        assert!(!pending.snapshot);
    }

    #[tokio::test]
    async fn failed_listener_leaves_solver_running() {
        let actions = ActionSignal::new();
        relay_interrupts(
            || std::future::ready(Err(io::Error::other("no signal support"))),
            actions.clone(),
        )
        .await;
        assert!(actions.take().is_empty());
    }

    #[test]
    fn mismatched_initial_grid_is_rejected() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.toml");
        let init = dir.path().join("init.toml");
        write_grid(&target, vec![1, 2], vec![0.0, 1.0]);
        write_grid(&init, vec![1, 3], vec![0.0, 1.0, 2.0]);

        let mut args = args(target);
        args.init = Some(init);
        assert!(matches!(run(args), Err(CliError::Network(_))));
    }

    #[test]
    fn malformed_grid_record_reports_file_parsing_error() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.toml");
        write_grid(&target, vec![2, 2], vec![0.0, 1.0]);
        assert!(matches!(
            run(args(target)),
            Err(CliError::FileParsing { .. })
        ));
    }
}
