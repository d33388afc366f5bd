use crate::cli::InspectArgs;
use crate::error::Result;
use posegrad::engine::checkpoint::{SolverState, TensorRecord};
use std::fmt::Write;
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    info!("Loading solver state from {:?}", &args.state);
    let state = SolverState::load(&args.state)?;
    print!("{}", render(&state));
    Ok(())
}

struct TensorSummary {
    min: f32,
    max: f32,
    mean: f64,
    l2_norm: f64,
}

fn summarize(record: &TensorRecord) -> Option<TensorSummary> {
    if record.data.is_empty() {
        return None;
    }
    let (min, max) = record
        .data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let sum: f64 = record.data.iter().map(|&v| f64::from(v)).sum();
    let squares: f64 = record.data.iter().map(|&v| f64::from(v).powi(2)).sum();
    Some(TensorSummary {
        min,
        max,
        mean: sum / record.data.len() as f64,
        l2_norm: squares.sqrt(),
    })
}

fn describe(label: &str, record: &TensorRecord) -> String {
    match summarize(record) {
        Some(s) => format!(
            "{:<12} shape {:?}  min {:.6e}  max {:.6e}  mean {:.6e}  |x| {:.6e}",
            label, record.shape, s.min, s.max, s.mean, s.l2_norm
        ),
        None => format!("{:<12} shape {:?}  (empty)", label, record.shape),
    }
}

fn render(state: &SolverState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Iteration:    {}", state.iter);
    let _ = writeln!(out, "Current step: {}", state.current_step);
    let _ = writeln!(out, "Model file:   {}", state.learned_net);
    let _ = writeln!(out, "History:      {} tensor(s)", state.history.len());
    for (i, record) in state.history.iter().enumerate() {
        let _ = writeln!(out, "  {}", describe(&format!("history[{}]", i), record));
    }
    let _ = writeln!(out, "  {}", describe("input", &state.input));
    out
}
