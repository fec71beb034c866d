use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;

/// Full-precision counterpart of a mixed-precision gradient scaler.
///
/// Burn trains in the backend's float type, so no loss scaling is applied.
/// What remains is the overflow guard: a step whose loss is not finite is
/// skipped instead of corrupting the weights, and flagged until `update`.
#[derive(Debug, Clone, Default)]
pub struct GradScaler {
    found_non_finite: bool,
    skipped_steps: usize,
    applied_steps: usize,
}

impl GradScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipped_steps(&self) -> usize {
        self.skipped_steps
    }

    pub fn applied_steps(&self) -> usize {
        self.applied_steps
    }

    /// Apply one optimizer update from `grads`, unless `loss_value` is not finite.
    pub fn step<B, M, O>(
        &mut self,
        optim: &mut O,
        lr: f64,
        model: M,
        grads: B::Gradients,
        loss_value: f32,
    ) -> M
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        if !loss_value.is_finite() {
            self.found_non_finite = true;
            self.skipped_steps += 1;
            tracing::warn!(loss = loss_value, "non-finite loss; skipping optimizer step");
            return model;
        }
        let grads = GradientsParams::from_grads(grads, &model);
        self.applied_steps += 1;
        optim.step(lr, model, grads)
    }

    /// Whether the last `step` was skipped.
    pub fn found_non_finite(&self) -> bool {
        self.found_non_finite
    }

    /// Close out the current iteration.
    pub fn update(&mut self) {
        self.found_non_finite = false;
    }
}
