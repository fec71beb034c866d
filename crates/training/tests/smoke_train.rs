//! Tiny end-to-end runs on the NdArray backend: a few 16x16 tiles, a 2-channel U-Net.

use burn::module::AutodiffModule;
use burn_dataset::SplitSpec;
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::fs;
use std::path::Path;
use burn_dataset::{BatchConfig, BatchIter, TileDataset};
use std::sync::atomic::{AtomicBool, Ordering};
use training::scaler::GradScaler;
use training::util::{
    build_optimizer, load_unet_from_checkpoint, save_checkpoint, select_device, train_epochs,
    train_model, ADBackend,
};
use training::{
    evaluate, evaluate_until, EvalSummary, RunConfig, TrainReport, UNet, UNetConfig,
};

const SIZE: u32 = 16;

fn write_tiles(root: &Path, tiles: u32, per_tile: usize) -> anyhow::Result<()> {
    write_sized_tiles(root, tiles, per_tile, SIZE)
}

fn write_sized_tiles(root: &Path, tiles: u32, per_tile: usize, size: u32) -> anyhow::Result<()> {
    for tile in 0..tiles {
        let images = root.join(tile.to_string()).join("images");
        let masks = root.join(tile.to_string()).join("masks");
        fs::create_dir_all(&images)?;
        fs::create_dir_all(&masks)?;
        for i in 0..per_tile {
            let name = format!("t{tile}_{i}");
            RgbImage::from_fn(size, size, |x, y| Rgb([(x * 15) as u8, (y * 15) as u8, 90]))
                .save(images.join(format!("{name}.jpg")))?;
            GrayImage::from_fn(size, size, |x, _| Luma([if x < size / 2 { 255 } else { 0 }]))
                .save(masks.join(format!("{name}.png")))?;
        }
    }
    Ok(())
}

fn tiny_config(root: &Path) -> RunConfig {
    RunConfig {
        data_root: root.join("data"),
        models_dir: root.join("models"),
        predictions_dir: root.join("predictions"),
        epochs: 1,
        batch_size: 1,
        split: SplitSpec::Sizes { train: 3, test: 1 },
        seed: Some(7),
        base_channels: 2,
        ..Default::default()
    }
}

#[test]
fn one_epoch_writes_model_and_report() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 2, 2)?;
    let cfg = tiny_config(tmp.path());

    let outcome = train_model(&cfg, &select_device(), &AtomicBool::new(false))?;
    assert!(!outcome.report.interrupted);
    assert_eq!(outcome.report.batches, 3);
    assert_eq!(outcome.report.epoch_losses.len(), 1);
    assert!(outcome.report.epoch_losses[0].is_finite());
    assert!(outcome.report.epoch_losses[0] >= 0.0);

    assert!(cfg.model_path().exists());
    assert!(!cfg.interrupted_path().exists());
    let report: TrainReport = serde_json::from_slice(&fs::read(cfg.report_path())?)?;
    assert_eq!(report.train_samples, 3);
    assert_eq!(report.test_samples, 1);
    Ok(())
}

#[test]
fn stop_flag_saves_interrupted_snapshot() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 2, 2)?;
    let cfg = tiny_config(tmp.path());

    let outcome = train_model(&cfg, &select_device(), &AtomicBool::new(true))?;
    assert!(outcome.report.interrupted);
    assert_eq!(outcome.report.batches, 0);
    assert!(cfg.interrupted_path().exists());
    assert!(cfg.model_path().exists());
    Ok(())
}

#[test]
fn empty_root_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    fs::create_dir_all(tmp.path().join("data"))?;
    let cfg = tiny_config(tmp.path());
    assert!(train_model(&cfg, &select_device(), &AtomicBool::new(false)).is_err());
    Ok(())
}

#[test]
fn checkpoint_round_trip_predicts_identically() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let device = select_device();
    let cfg = UNetConfig::new(3, 1).with_base_channels(2);
    let model = UNet::<training::TrainBackend>::new(cfg.clone(), &device);
    let path = tmp.path().join("nested").join("model.bin");
    save_checkpoint(&model, &path)?;

    let loaded = load_unet_from_checkpoint(&path, cfg, &device)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let input = burn::tensor::Tensor::<training::TrainBackend, 4>::ones([1, 3, 16, 16], &device);
    let a = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
    let b = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn evaluate_renders_panels_and_summary() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 2, 2)?;
    let mut cfg = tiny_config(tmp.path());
    cfg.eval_limit = Some(3);

    let outcome = train_model(&cfg, &select_device(), &AtomicBool::new(false))?;
    let summary = evaluate(&outcome.model.valid(), &cfg, &select_device())?;
    assert_eq!(summary.samples.len(), 3);
    assert!((0.0..=1.0).contains(&summary.mean_iou));

    let panel = image::open(cfg.predictions_dir.join("img_0.png"))?;
    assert_eq!(panel.width(), SIZE * 3 + vision_core::overlay::PANEL_GAP * 2);
    assert_eq!(panel.height(), SIZE);
    assert!(!cfg.predictions_dir.join("img_3.png").exists());

    let saved: EvalSummary =
        serde_json::from_slice(&fs::read(cfg.predictions_dir.join("summary.json"))?)?;
    assert_eq!(saved.samples.len(), 3);
    Ok(())
}

#[test]
fn channel_mismatch_is_reported() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 1, 1)?;
    let cfg = tiny_config(tmp.path());
    let device = select_device();
    let gray_model = UNet::<training::TrainBackend>::new(
        UNetConfig::new(1, 1).with_base_channels(2),
        &device,
    );
    let err = evaluate(&gray_model, &cfg, &device).unwrap_err();
    assert!(err.to_string().contains("input channels"));
    Ok(())
}

#[test]
fn single_pair_trains_and_renders() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 1, 1)?;
    let mut cfg = tiny_config(tmp.path());
    cfg.split = SplitSpec::Sizes { train: 1, test: 0 };

    let outcome = train_model(&cfg, &select_device(), &AtomicBool::new(false))?;
    assert_eq!(outcome.report.batches, 1);
    assert!(outcome.report.epoch_losses[0].is_finite());
    assert!(cfg.model_path().exists());

    evaluate(&outcome.model.valid(), &cfg, &select_device())?;
    assert!(cfg.predictions_dir.join("img_0.png").exists());
    Ok(())
}

fn sequential_loader(dataset: &TileDataset) -> BatchIter<'_> {
    BatchIter::new(
        dataset,
        BatchConfig {
            batch_size: 1,
            shuffle: false,
            seed: Some(3),
            drop_last: false,
        },
    )
}

fn tiny_ad_model(n_channels: usize) -> UNet<ADBackend> {
    UNet::new(
        UNetConfig::new(n_channels, 1).with_base_channels(2),
        &select_device(),
    )
}

#[test]
fn epoch_loss_is_sum_of_batch_losses() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 1, 3)?;
    let cfg = tiny_config(tmp.path());
    let dataset = TileDataset::from_root(&cfg.data_root, cfg.layout())?;
    let mut loader = sequential_loader(&dataset);
    let mut optim = build_optimizer(&cfg);
    let mut scaler = GradScaler::new();
    let mut losses = Vec::new();

    let outcome = train_epochs(
        tiny_ad_model(3),
        &mut optim,
        &mut scaler,
        &mut loader,
        2,
        cfg.lr,
        &select_device(),
        &AtomicBool::new(false),
        |_, loss| losses.push(loss),
    )?;
    assert_eq!(losses.len(), 6);
    assert!(losses.iter().all(|l| l.is_finite() && *l >= 0.0));
    assert_eq!(outcome.report.epoch_losses.len(), 2);
    for (epoch, chunk) in losses.chunks(3).enumerate() {
        let expected: f32 = chunk.iter().sum();
        assert!((outcome.report.epoch_losses[epoch] - expected).abs() < 1e-5);
    }
    assert_eq!(scaler.applied_steps(), 6);
    Ok(())
}

#[test]
fn stop_mid_epoch_keeps_partial_loss() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 1, 4)?;
    let cfg = tiny_config(tmp.path());
    let dataset = TileDataset::from_root(&cfg.data_root, cfg.layout())?;
    let mut loader = sequential_loader(&dataset);
    let mut optim = build_optimizer(&cfg);
    let mut scaler = GradScaler::new();
    let stop = AtomicBool::new(false);
    let mut losses = Vec::new();

    let outcome = train_epochs(
        tiny_ad_model(3),
        &mut optim,
        &mut scaler,
        &mut loader,
        2,
        cfg.lr,
        &select_device(),
        &stop,
        |batch, loss| {
            losses.push(loss);
            if batch == 1 {
                stop.store(true, Ordering::SeqCst);
            }
        },
    )?;
    assert!(outcome.report.interrupted);
    assert_eq!(outcome.report.batches, 2);
    assert_eq!(outcome.report.epoch_losses.len(), 1);
    assert!((outcome.report.epoch_losses[0] - (losses[0] + losses[1])).abs() < 1e-5);
    Ok(())
}

#[test]
fn training_rejects_channel_mismatch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 1, 1)?;
    let cfg = tiny_config(tmp.path());
    let dataset = TileDataset::from_root(&cfg.data_root, cfg.layout())?;
    let mut loader = sequential_loader(&dataset);
    let mut optim = build_optimizer(&cfg);
    let mut scaler = GradScaler::new();

    let result = train_epochs(
        tiny_ad_model(1),
        &mut optim,
        &mut scaler,
        &mut loader,
        1,
        cfg.lr,
        &select_device(),
        &AtomicBool::new(false),
        |_, _| {},
    );
    let err = result.err().map(|e| e.to_string()).unwrap_or_default();
    assert!(err.contains("defined with 1 input channels"));
    assert!(err.contains("have 3 channels"));
    assert_eq!(scaler.applied_steps(), 0);
    Ok(())
}

#[test]
fn tiles_too_small_for_the_network_are_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_sized_tiles(&tmp.path().join("data"), 1, 1, 8)?;
    let mut cfg = tiny_config(tmp.path());
    cfg.split = SplitSpec::Sizes { train: 1, test: 0 };

    let err = train_model(&cfg, &select_device(), &AtomicBool::new(false)).unwrap_err();
    assert!(err.to_string().contains("at least 16"));
    Ok(())
}

#[test]
fn stopped_evaluation_writes_partial_summary() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_tiles(&tmp.path().join("data"), 1, 2)?;
    let cfg = tiny_config(tmp.path());
    let device = select_device();
    let model = UNet::<training::TrainBackend>::new(cfg.model_config(), &device);

    let summary = evaluate_until(&model, &cfg, &device, &AtomicBool::new(true))?;
    assert!(summary.interrupted);
    assert!(summary.samples.is_empty());
    assert!(!cfg.predictions_dir.join("img_0.png").exists());
    let saved: EvalSummary =
        serde_json::from_slice(&fs::read(cfg.predictions_dir.join("summary.json"))?)?;
    assert!(saved.interrupted);
    Ok(())
}
