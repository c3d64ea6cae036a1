//! Optimizer - Adam + plateau learning-rate schedule

use ndarray::{ArrayD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

// ============================================================================
// ADAM
// ============================================================================

#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    step: i32,
    first_moment: Vec<ArrayD<f32>>,
    second_moment: Vec<ArrayD<f32>>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
        }
    }

    pub fn steps(&self) -> i32 {
        self.step
    }

    /// Apply one update. `params` and `grads` must line up one-to-one.
    pub fn step(&mut self, params: Vec<ArrayViewMutD<'_, f32>>, grads: &[ArrayD<f32>]) {
        debug_assert_eq!(params.len(), grads.len());
        if self.first_moment.len() != grads.len() {
            self.first_moment = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.second_moment = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
        }

        self.step += 1;
        let (b1, b2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let bias1 = 1.0 - b1.powi(self.step);
        let bias2 = 1.0 - b2.powi(self.step);

        for (((param, grad), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(self.first_moment.iter_mut())
            .zip(self.second_moment.iter_mut())
        {
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

// ============================================================================
// REDUCE LR ON PLATEAU
// ============================================================================

/// Halve the learning rate when validation loss stops improving
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateauScheduler {
    pub factor: f32,
    pub patience: usize,
    /// Relative improvement required to reset patience
    pub threshold: f32,
    pub min_lr: f32,
    best: f32,
    bad_epochs: usize,
}

impl Default for PlateauScheduler {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 10,
            threshold: 1e-4,
            min_lr: 0.0,
            best: f32::INFINITY,
            bad_epochs: 0,
        }
    }
}

impl PlateauScheduler {
    pub fn new(factor: f32, patience: usize) -> Self {
        Self {
            factor,
            patience,
            ..Default::default()
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    /// Feed one epoch's validation loss; returns true when the rate was reduced
    pub fn observe(&mut self, metric: f32, optimizer: &mut Adam) -> bool {
        if metric < self.best * (1.0 - self.threshold) {
            self.best = metric;
            self.bad_epochs = 0;
            return false;
        }

        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            let reduced = (optimizer.learning_rate * self.factor).max(self.min_lr);
            self.bad_epochs = 0;
            if reduced < optimizer.learning_rate {
                log::info!(
                    "Validation loss plateaued at {:.6}: learning rate {:.2e} -> {:.2e}",
                    self.best, optimizer.learning_rate, reduced
                );
                optimizer.learning_rate = reduced;
                return true;
            }
        }
        false
    }
}
