use super::config::ExecutionMode;
use super::error::SolverError;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Element-wise kernels behind one solver update.
///
/// Every operation is independent per element, so implementations are free to
/// split the work however they like.
pub trait UpdateBackend: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    fn sum_of_squares(&self, values: &[f32]) -> f64;

    fn scale(&self, values: &mut [f32], factor: f32);

    /// `history = momentum * history + rate * diff`, then `diff = history`.
    fn momentum_update(&self, diff: &mut [f32], history: &mut [f32], momentum: f32, rate: f32);

    /// Sets every negative element to zero.
    fn clamp_negative(&self, values: &mut [f32]);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl UpdateBackend for CpuBackend {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Cpu
    }

    fn sum_of_squares(&self, values: &[f32]) -> f64 {
        #[cfg(feature = "parallel")]
        let iter = values.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = values.iter();

        iter.map(|&v| f64::from(v) * f64::from(v)).sum()
    }

    fn scale(&self, values: &mut [f32], factor: f32) {
        #[cfg(feature = "parallel")]
        let iter = values.par_iter_mut();
        #[cfg(not(feature = "parallel"))]
        let iter = values.iter_mut();

        iter.for_each(|v| *v *= factor);
    }

    fn momentum_update(&self, diff: &mut [f32], history: &mut [f32], momentum: f32, rate: f32) {
        debug_assert_eq!(diff.len(), history.len());

        #[cfg(feature = "parallel")]
        let iter = diff.par_iter_mut().zip(history.par_iter_mut());
        #[cfg(not(feature = "parallel"))]
        let iter = diff.iter_mut().zip(history.iter_mut());

        iter.for_each(|(d, h)| {
            *h = momentum * *h + rate * *d;
            *d = *h;
        });
    }

    fn clamp_negative(&self, values: &mut [f32]) {
        #[cfg(feature = "parallel")]
        let iter = values.par_iter_mut();
        #[cfg(not(feature = "parallel"))]
        let iter = values.iter_mut();

        iter.for_each(|v| {
            if *v < 0.0 {
                *v = 0.0;
            }
        });
    }
}

/// Resolves the backend for `mode`.
///
/// # Errors
///
/// Returns [`SolverError::BackendUnavailable`] for modes without a compiled-in backend.
pub fn backend_for(mode: ExecutionMode) -> Result<Box<dyn UpdateBackend>, SolverError> {
    match mode {
        ExecutionMode::Cpu => Ok(Box::new(CpuBackend)),
        ExecutionMode::Accelerator => Err(SolverError::BackendUnavailable(mode)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_of_squares_accumulates_every_element() {
        assert_eq!(CpuBackend.sum_of_squares(&[3.0, -4.0]), 25.0);
        assert_eq!(CpuBackend.sum_of_squares(&[]), 0.0);
    }

    #[test]
    fn momentum_update_writes_history_back_into_diff() {
        let mut diff = vec![1.0, -2.0];
        let mut history = vec![0.5, 0.5];
        CpuBackend.momentum_update(&mut diff, &mut history, 0.9, 0.1);
        let expected = [0.9 * 0.5 + 0.1 * 1.0, 0.9 * 0.5 + 0.1 * -2.0];
        for i in 0..2 {
            assert!((history[i] - expected[i]).abs() < 1e-6);
            assert_eq!(diff[i], history[i]);
        }
    }

    #[test]
    fn clamp_negative_leaves_non_negative_values_alone() {
        let mut values = vec![-1.0, 0.0, 2.5, -0.0001];
        CpuBackend.clamp_negative(&mut values);
        assert_eq!(values, vec![0.0, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn scale_multiplies_in_place() {
        let mut values = vec![2.0, -4.0];
        CpuBackend.scale(&mut values, 0.5);
        assert_eq!(values, vec![1.0, -2.0]);
    }

    #[test]
    fn accelerator_backend_is_unavailable() {
        assert!(matches!(
            backend_for(ExecutionMode::Accelerator),
            Err(SolverError::BackendUnavailable(ExecutionMode::Accelerator))
        ));
        assert_eq!(
            backend_for(ExecutionMode::Cpu).unwrap().mode(),
            ExecutionMode::Cpu
        );
    }
}
