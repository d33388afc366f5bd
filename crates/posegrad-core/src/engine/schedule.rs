use super::config::{LearningRateConfig, LearningRatePolicy};
use tracing::info;

/// Learning rate at `iter` for the configured policy.
///
/// `step` and `multistep` advance `current_step`, which is part of the
/// checkpointed solver state.
pub fn learning_rate(
    config: &LearningRateConfig,
    max_iter: usize,
    iter: usize,
    current_step: &mut usize,
) -> f64 {
    let it = iter as f64;
    match config.policy {
        LearningRatePolicy::Fixed => config.base_lr,
        LearningRatePolicy::Step => {
            *current_step = iter / config.stepsize;
            config.base_lr * config.gamma.powi(*current_step as i32)
        }
        LearningRatePolicy::Exp => config.base_lr * config.gamma.powf(it),
        LearningRatePolicy::Inv => {
            config.base_lr * (1.0 + config.gamma * it).powf(-config.power)
        }
        LearningRatePolicy::MultiStep => {
            if config
                .stepvalues
                .get(*current_step)
                .is_some_and(|&boundary| iter >= boundary)
            {
                *current_step += 1;
                info!("MultiStep status: iteration {}, step = {}", iter, *current_step);
            }
            config.base_lr * config.gamma.powi(*current_step as i32)
        }
        LearningRatePolicy::Poly => {
            let progress = if max_iter == 0 { 1.0 } else { it / max_iter as f64 };
            config.base_lr * (1.0 - progress).max(0.0).powf(config.power)
        }
        LearningRatePolicy::Sigmoid => {
            let centered = it - config.stepsize as f64;
            config.base_lr / (1.0 + (-config.gamma * centered).exp())
        }
    }
}

/// Running mean of the last `window` iteration losses.
#[derive(Debug, Clone)]
pub struct SmoothedLoss {
    window: usize,
    losses: Vec<f32>,
    value: f32,
}

impl SmoothedLoss {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            losses: Vec::with_capacity(window.max(1)),
            value: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.losses.clear();
        self.value = 0.0;
    }

    /// Folds in the loss of iteration `iter`, where `start_iter` is the first
    /// iteration since the last reset.
    pub fn update(&mut self, loss: f32, iter: usize, start_iter: usize) {
        if self.losses.len() < self.window {
            self.losses.push(loss);
            let n = self.losses.len() as f32;
            self.value = (self.value * (n - 1.0) + loss) / n;
        } else {
            let idx = (iter - start_iter) % self.window;
            self.value += (loss - self.losses[idx]) / self.window as f32;
            self.losses[idx] = loss;
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}
