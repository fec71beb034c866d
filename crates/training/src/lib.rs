#![recursion_limit = "256"]

pub mod config;
pub mod eval;
pub mod loss;
pub mod scaler;
pub mod util;

pub use config::{BackendKind, ConfigArgs, RunConfig};
pub use eval::{evaluate, evaluate_until, EvalSummary, SampleScore};
pub use models::{UNet, UNetConfig};
pub use util::{run_pipeline, run_train, train_model, TrainArgs, TrainOutcome, TrainReport};
/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
