use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileThresholdConfig};
use super::models::AppConfig;
use crate::cli::OptimizeArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use posegrad::engine::config::{
    ExecutionMode, GridLayout, LearningRatePolicy, SnapshotFormat, SolverConfigBuilder,
};
use std::path::PathBuf;
use std::str::FromStr;

pub fn build_config(args: &OptimizeArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let lr_file = file_config.learning_rate.take().unwrap_or_default();
    let policy: LearningRatePolicy = parse_core(
        lr_file.policy.as_deref().unwrap_or(&defaults.lr_policy),
    )?;
    let base_lr = args
        .base_lr
        .or(lr_file.base_lr)
        .unwrap_or(defaults.base_lr);

    let solver_file = file_config.solver.take().unwrap_or_default();
    let max_iter = args
        .max_iter
        .or(solver_file.max_iter)
        .unwrap_or(defaults.max_iter);
    let execution_mode: ExecutionMode = parse_core(
        solver_file
            .execution_mode
            .as_deref()
            .unwrap_or(&defaults.execution_mode),
    )?;

    let snapshot_file = file_config.snapshot.take().unwrap_or_default();
    let snapshot_prefix = args.snapshot_prefix.clone().or(snapshot_file.prefix);
    let snapshot_format: SnapshotFormat = parse_core(
        snapshot_file
            .format
            .as_deref()
            .unwrap_or(&defaults.snapshot_format),
    )?;
    let snapshot_after_train = snapshot_file
        .after_train
        .unwrap_or(snapshot_prefix.is_some());

    let test_file = file_config.test.take().unwrap_or_default();
    let threshold_file = file_config.threshold.take().unwrap_or_default();
    let threshold_update = args.threshold || threshold_file.enabled.unwrap_or(false);
    let grid = merge_grid(&threshold_file, threshold_update)?;

    let mut builder = SolverConfigBuilder::new()
        .base_lr(base_lr)
        .lr_policy(policy)
        .max_iter(max_iter)
        .momentum(solver_file.momentum.unwrap_or(defaults.momentum))
        .display(solver_file.display.unwrap_or(defaults.display))
        .debug_info(solver_file.debug_info.unwrap_or(false))
        .snapshot(snapshot_file.interval.unwrap_or(0))
        .snapshot_format(snapshot_format)
        .snapshot_after_train(snapshot_after_train)
        .threshold_update(threshold_update)
        .grid(grid)
        .execution_mode(execution_mode);

    if let Some(gamma) = lr_file.gamma {
        builder = builder.gamma(gamma);
    }
    if let Some(power) = lr_file.power {
        builder = builder.power(power);
    }
    if let Some(stepsize) = lr_file.stepsize {
        builder = builder.stepsize(stepsize);
    }
    if let Some(stepvalues) = lr_file.stepvalues {
        builder = builder.stepvalues(stepvalues);
    }
    if let Some(ceiling) = solver_file.clip_gradients {
        builder = builder.clip_gradients(ceiling);
    }
    if let Some(iter_size) = solver_file.iter_size {
        builder = builder.iter_size(iter_size);
    }
    if let Some(window) = solver_file.average_loss {
        builder = builder.average_loss(window);
    }
    if let Some(interval) = test_file.interval {
        builder = builder.test_interval(interval);
    }
    if let Some(iterations) = test_file.iterations {
        builder = builder.test_iter(iterations);
    }
    if let Some(initialization) = test_file.initialization {
        builder = builder.test_initialization(initialization);
    }
    if let Some(prefix) = snapshot_prefix {
        builder = builder.snapshot_prefix(prefix);
    }

    let solver = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(AppConfig {
        target_path: args.target.clone(),
        init_path: args.init.clone(),
        output_path: args.output.clone(),
        resume_path: args.resume.clone(),
        solver,
    })
}

fn parse_core<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| CliError::Config(e.to_string()))
}

fn merge_grid(file_val: &FileThresholdConfig, enabled: bool) -> Result<GridLayout> {
    if !enabled {
        return Ok(GridLayout {
            receptor_channels: file_val.receptor_channels.unwrap_or(0),
            ligand_channels: file_val.ligand_channels.unwrap_or(0),
            grid_points: file_val.grid_points.unwrap_or(0),
        });
    }
    Ok(GridLayout {
        receptor_channels: file_val.receptor_channels.ok_or_else(|| {
            CliError::Config("`threshold` requires `receptor-channels`".to_string())
        })?,
        ligand_channels: file_val.ligand_channels.ok_or_else(|| {
            CliError::Config("`threshold` requires `ligand-channels`".to_string())
        })?,
        grid_points: file_val
            .grid_points
            .ok_or_else(|| CliError::Config("`threshold` requires `grid-points`".to_string()))?,
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let (key, value_str) = parser::parse_key_value(kv_pair)
            .map_err(|e| CliError::Argument(e.to_string()))?;

        match key {
            "learning-rate.base-lr" => {
                config
                    .learning_rate
                    .get_or_insert_with(Default::default)
                    .base_lr = Some(parse_value(key, value_str)?);
            }
            "learning-rate.policy" => {
                config
                    .learning_rate
                    .get_or_insert_with(Default::default)
                    .policy = Some(value_str.to_string());
            }
            "learning-rate.gamma" => {
                config.learning_rate.get_or_insert_with(Default::default).gamma =
                    Some(parse_value(key, value_str)?);
            }
            "learning-rate.power" => {
                config.learning_rate.get_or_insert_with(Default::default).power =
                    Some(parse_value(key, value_str)?);
            }
            "learning-rate.stepsize" => {
                config
                    .learning_rate
                    .get_or_insert_with(Default::default)
                    .stepsize = Some(parse_value(key, value_str)?);
            }
            "learning-rate.stepvalues" => {
                config
                    .learning_rate
                    .get_or_insert_with(Default::default)
                    .stepvalues = Some(
                    parser::parse_list(value_str)
                        .map_err(|e| CliError::Argument(format!("{}: {}", key, e)))?,
                );
            }
            "solver.max-iter" => {
                config.solver.get_or_insert_with(Default::default).max_iter =
                    Some(parse_value(key, value_str)?);
            }
            "solver.momentum" => {
                config.solver.get_or_insert_with(Default::default).momentum =
                    Some(parse_value(key, value_str)?);
            }
            "solver.clip-gradients" => {
                config
                    .solver
                    .get_or_insert_with(Default::default)
                    .clip_gradients = Some(parse_value(key, value_str)?);
            }
            "solver.iter-size" => {
                config.solver.get_or_insert_with(Default::default).iter_size =
                    Some(parse_value(key, value_str)?);
            }
            "solver.average-loss" => {
                config.solver.get_or_insert_with(Default::default).average_loss =
                    Some(parse_value(key, value_str)?);
            }
            "solver.display" => {
                config.solver.get_or_insert_with(Default::default).display =
                    Some(parse_value(key, value_str)?);
            }
            "solver.execution-mode" => {
                config
                    .solver
                    .get_or_insert_with(Default::default)
                    .execution_mode = Some(value_str.to_string());
            }
            "test.interval" => {
                config.test.get_or_insert_with(Default::default).interval =
                    Some(parse_value(key, value_str)?);
            }
            "test.iterations" => {
                config.test.get_or_insert_with(Default::default).iterations =
                    Some(parse_value(key, value_str)?);
            }
            "snapshot.interval" => {
                config.snapshot.get_or_insert_with(Default::default).interval =
                    Some(parse_value(key, value_str)?);
            }
            "snapshot.prefix" => {
                config.snapshot.get_or_insert_with(Default::default).prefix =
                    Some(PathBuf::from(value_str));
            }
            "snapshot.format" => {
                config.snapshot.get_or_insert_with(Default::default).format =
                    Some(value_str.to_string());
            }
            "threshold.enabled" => {
                config.threshold.get_or_insert_with(Default::default).enabled =
                    Some(parse_value(key, value_str)?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

fn parse_value<T: FromStr>(key: &str, value_str: &str) -> Result<T> {
    value_str.parse().map_err(|_| {
        CliError::Config(format!(
            "Invalid {} value for {}: {}",
            std::any::type_name::<T>(),
            key,
            value_str
        ))
    })
}
