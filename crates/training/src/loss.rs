use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Mean binary cross-entropy on raw logits.
///
/// Uses `max(x, 0) - x * t + ln(1 + e^-|x|)`, which never exponentiates a
/// large positive value.
pub fn bce_with_logits<B: Backend, const D: usize>(
    logits: Tensor<B, D>,
    targets: Tensor<B, D>,
) -> Tensor<B, 1> {
    let positive = logits.clone().clamp_min(0.0);
    let soft = logits.clone().abs().neg().exp().log1p();
    (positive - logits * targets + soft).mean()
}

/// First element of a tensor as `f32`.
pub fn scalar_f32<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> anyhow::Result<f32> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read back scalar: {e:?}"))?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("cannot read a scalar from an empty tensor"))
}
