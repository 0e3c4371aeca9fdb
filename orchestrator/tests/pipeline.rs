use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

use flate2::{Compression, write::GzEncoder};
use machine_learning::arch::NetBuilder;
use orchestrator::{
    OrchestratorError, checkpoint,
    configs::{EmbeddingConfig, RunConfig},
    run,
};
use rand::{SeedableRng, rngs::StdRng};
use shards::FeatureSpec;
use tempfile::TempDir;

const HEADER: &str = "click_id,app,is_attributed,timediff,avg_ip";

/// Writes `shards` gzip CSV files of `rows` rows each. Rows alternate between a positive
/// with a big `timediff` and a negative with a small one.
fn write_shards(dir: &Path, shards: usize, rows: usize) {
    fs::create_dir_all(dir).unwrap();

    for s in 0..shards {
        let file = File::create(dir.join(format!("part-{s:02}.csv.gz"))).unwrap();
        let mut gz = GzEncoder::new(file, Compression::default());
        writeln!(gz, "{HEADER}").unwrap();

        for r in 0..rows {
            let id = s * rows + r;
            let positive = r % 2 == 0;
            let timediff = match positive {
                true => 0.6 + (r % 5) as f32 * 0.1,
                false => (r % 5) as f32 * 0.1,
            };
            writeln!(gz, "{id},{},{},{timediff},{}", id % 7, positive as u8, r % 3).unwrap();
        }

        gz.finish().unwrap();
    }
}

fn config(dir: &Path) -> RunConfig {
    let mut config = RunConfig {
        hidden_layers: vec![4],
        learning_rate: 0.01,
        ..Default::default()
    };

    let training = &mut config.training;
    training.raw_pattern = format!("{}/raw/*.csv.gz", dir.display());
    training.cache_dir = dir.join("cache");
    training.checkpoint = dir.join("weights").join("best.safetensors");
    training.metrics_dir = dir.join("logs");
    training.batch_size = 8;
    training.epochs = 4;
    training.valid_fraction = 0.25;
    training.early_stopping_patience = 10;
    training.features = FeatureSpec {
        label: "is_attributed".into(),
        dense: vec!["timediff".into(), "avg_ip".into()],
        categorical: vec!["app".into()],
    };
    training.embeddings = vec![EmbeddingConfig {
        column: "app".into(),
        vocab: 8,
        dim: 2,
    }];

    config
}

fn setup() -> (TempDir, RunConfig) {
    let dir = tempfile::tempdir().unwrap();
    write_shards(&dir.path().join("raw"), 6, 20);
    let config = config(dir.path());
    (dir, config)
}

#[test]
fn full_run_reports_and_saves_every_epoch() {
    let (dir, config) = setup();

    let history = run(config.clone()).unwrap();

    assert_eq!(history.len(), 4);
    assert!(!history.stopped_early);
    for logs in &history.epochs {
        for key in ["loss", "val_loss", "lr", "val_auc"] {
            assert!(logs.contains_key(key), "{key} missing from {logs:?}");
        }
        assert!(logs["loss"].is_finite());
        assert!((0. ..=1.).contains(&logs["val_auc"]));
    }

    let metrics = fs::read_to_string(dir.path().join("logs").join("metrics.jsonl")).unwrap();
    assert_eq!(metrics.lines().count(), 4);

    assert!(config.training.checkpoint.exists());
    assert!(fs::read_dir(dir.path().join("cache")).unwrap().count() >= 6);
}

#[test]
fn checkpoint_holds_a_loadable_network() {
    let (_dir, config) = setup();
    run(config.clone()).unwrap();

    let mut net = NetBuilder::new(2)
        .embedding(8, 2)
        .hidden([4])
        .build(&mut StdRng::seed_from_u64(99))
        .unwrap();
    let metadata = checkpoint::load(&config.training.checkpoint, &mut net).unwrap();

    assert_eq!(metadata["monitor"], "val_loss");
    assert!(metadata.contains_key("epoch"));

    // Resuming from the checkpoint trains on top of it.
    let mut resumed = config.clone();
    resumed.training.resume_from = Some(config.training.checkpoint.clone());
    resumed.training.epochs = 1;
    assert_eq!(run(resumed).unwrap().len(), 1);
}

#[test]
fn same_seed_same_history_with_or_without_prefetching() {
    let (_a, config) = setup();
    let (_b, mut prefetching) = setup();
    prefetching.training.prefetch = 2;

    let first = run(config).unwrap();
    let second = run(prefetching).unwrap();

    assert_eq!(first, second);
}

#[test]
fn stalled_validation_loss_stops_training() {
    let (_dir, mut config) = setup();
    config.learning_rate = 1e-9;
    config.training.epochs = 50;
    config.training.min_delta = 0.01;
    config.training.early_stopping_patience = 2;

    let history = run(config).unwrap();

    assert!(history.stopped_early);
    assert_eq!(history.len(), 3);
}

#[test]
fn configured_steps_override_the_row_counts() {
    let (_dir, mut config) = setup();
    config.training.steps_per_epoch = Some(1);
    config.training.validation_steps = Some(0);
    config.training.epochs = 2;

    let history = run(config).unwrap();

    assert_eq!(history.len(), 2);
    assert!(!history.epochs[0].contains_key("val_loss"));
}

#[test]
fn no_matching_shards_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    assert!(matches!(run(config), Err(OrchestratorError::NoShards { .. })));
}

#[test]
fn invalid_configs_fail_before_reading_shards() {
    let (_dir, mut config) = setup();
    config.training.embeddings.clear();

    assert!(matches!(
        run(config),
        Err(OrchestratorError::InvalidConfig(_))
    ));
}
