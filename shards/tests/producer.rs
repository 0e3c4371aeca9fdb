use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};
use rand::{SeedableRng, rngs::StdRng};
use shards::{
    Batch, BatchSource, Column, FeatureSpec, Prefetcher, Schema, ShardCache, StalePolicy,
};
use tempfile::TempDir;

const HEADER: &str = "click_id,app,os,click_time,is_attributed,timediff,avg_ip";

/// Writes a shard whose `click_id` runs from `first` and whose other columns derive from it.
fn write_shard(dir: &Path, name: &str, first: usize, rows: usize) -> PathBuf {
    let mut body = format!("{HEADER}\n");
    for id in first..first + rows {
        body.push_str(&format!(
            "{id},{},{},2017-11-07 09:30:{:02},{},{}.5,{}\n",
            id % 7,
            id % 3,
            id % 60,
            id % 2,
            id,
            id % 100
        ));
    }
    write_raw(dir, name, &body)
}

fn write_raw(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    enc.write_all(body.as_bytes()).unwrap();
    enc.finish().unwrap();
    path
}

fn features() -> FeatureSpec {
    FeatureSpec {
        label: "is_attributed".into(),
        dense: vec!["click_id".into(), "timediff".into(), "avg_ip".into()],
        categorical: vec!["app".into(), "os".into()],
    }
}

fn source(dir: &Path, batch_size: usize) -> BatchSource {
    let cache = ShardCache::new(dir.join("cache2/train"), Schema::click_log());
    BatchSource::new(cache, features(), NonZeroUsize::new(batch_size).unwrap())
}

fn ids(batch: &Batch) -> Vec<usize> {
    batch.dense.column(0).iter().map(|&v| v as usize).collect()
}

fn sorted(mut v: Vec<usize>) -> Vec<usize> {
    v.sort_unstable();
    v
}

#[test]
fn three_shards_of_ten_zero_and_five_rows() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_shard(dir.path(), "s0.csv.gz", 0, 10),
        write_shard(dir.path(), "s1.csv.gz", 100, 0),
        write_shard(dir.path(), "s2.csv.gz", 200, 5),
    ];
    let src = source(dir.path(), 4);

    let batches: Vec<Batch> = src
        .produce(paths.clone(), false, StdRng::seed_from_u64(42))
        .collect::<shards::Result<_>>()
        .unwrap();

    let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
    assert_eq!(sizes, [4, 4, 2, 4, 1]);
    assert_eq!(src.count_batches(&paths).unwrap(), 5);
}

#[test]
fn every_array_of_a_batch_has_the_same_rows() {
    let dir = TempDir::new().unwrap();
    let paths = vec![write_shard(dir.path(), "s0.csv.gz", 0, 23)];

    for batch_size in [1, 2, 5, 23, 64] {
        let src = source(dir.path(), batch_size);
        let mut total = 0;

        for batch in src.produce(paths.clone(), false, StdRng::seed_from_u64(7)) {
            let batch = batch.unwrap();
            let rows = batch.len();

            assert!(rows >= 1 && rows <= batch_size);
            assert_eq!(batch.dense.dim(), (rows, 3));
            assert_eq!(batch.labels.len(), rows);
            assert_eq!(batch.categorical.len(), 2);
            assert!(batch.categorical.iter().all(|c| c.len() == rows));
            total += rows;
        }

        assert_eq!(total, 23, "batch size {batch_size}");
    }
}

#[test]
fn rows_only_move_within_their_shard() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_shard(dir.path(), "a.csv.gz", 0, 9),
        write_shard(dir.path(), "b.csv.gz", 1000, 6),
    ];
    let src = source(dir.path(), 4);

    let batches: Vec<Batch> = src
        .produce(paths, false, StdRng::seed_from_u64(3))
        .map(Result::unwrap)
        .collect();

    // Shard `a` is sliced into 4 + 4 + 1 rows, `b` into 4 + 2.
    let a: Vec<usize> = batches[..3].iter().flat_map(ids).collect();
    let b: Vec<usize> = batches[3..].iter().flat_map(ids).collect();

    assert_eq!(sorted(a), (0..9).collect::<Vec<_>>());
    assert_eq!(sorted(b), (1000..1006).collect::<Vec<_>>());

    // Every row keeps its own label and categorical codes.
    for batch in &batches {
        for (i, id) in ids(batch).into_iter().enumerate() {
            assert_eq!(batch.labels[i], (id % 2) as f32);
            assert_eq!(batch.categorical[0][i], (id % 7) as i64);
            assert_eq!(batch.categorical[1][i], (id % 3) as i64);
        }
    }
}

#[test]
fn repeating_passes_keep_the_shard_order_and_reshuffle_rows() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_shard(dir.path(), "a.csv.gz", 0, 32),
        write_shard(dir.path(), "b.csv.gz", 1000, 32),
    ];
    let src = source(dir.path(), 32);

    let batches: Vec<Batch> = src
        .produce(paths, true, StdRng::seed_from_u64(11))
        .take(6)
        .map(Result::unwrap)
        .collect();

    let from_a: Vec<bool> = batches.iter().map(|b| ids(b)[0] < 1000).collect();
    assert_eq!(from_a, [true, false, true, false, true, false]);

    // Same rows, fresh permutation on every pass.
    assert_eq!(sorted(ids(&batches[0])), sorted(ids(&batches[2])));
    assert_ne!(ids(&batches[0]), ids(&batches[2]));
}

#[test]
fn same_seed_same_sequence() {
    let dir = TempDir::new().unwrap();
    let paths = vec![write_shard(dir.path(), "a.csv.gz", 0, 17)];
    let src = source(dir.path(), 5);

    let run = |seed| -> Vec<Batch> {
        src.produce(paths.clone(), false, StdRng::seed_from_u64(seed))
            .map(Result::unwrap)
            .collect()
    };

    assert_eq!(run(5), run(5));
    assert_ne!(run(5), run(6));
}

#[test]
fn missing_dense_values_become_minus_one() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{HEADER}\n1,2,3,2017-11-07 09:30:00,1,,7\n2,2,3,2017-11-07 09:30:01,0,NA,\n"
    );
    let paths = vec![write_raw(dir.path(), "n.csv.gz", &body)];
    let src = source(dir.path(), 8);

    let batch = src
        .produce(paths, false, StdRng::seed_from_u64(0))
        .next()
        .unwrap()
        .unwrap();

    let timediff = batch.dense.column(1);
    assert!(timediff.iter().all(|&v| v == -1.0));
    assert!(batch.dense.iter().all(|v| !v.is_nan()));
    assert!(batch.labels.iter().all(|v| !v.is_nan()));

    let mut avg_ip: Vec<f32> = batch.dense.column(2).to_vec();
    avg_ip.sort_by(f32::total_cmp);
    assert_eq!(avg_ip, [-1.0, 7.0]);
}

#[test]
fn missing_label_is_rejected() {
    let dir = TempDir::new().unwrap();
    let body = format!("{HEADER}\n1,2,3,2017-11-07 09:30:00,,0.5,7\n");
    let paths = vec![write_raw(dir.path(), "l.csv.gz", &body)];
    let src = source(dir.path(), 8);

    let first = src.produce(paths, false, StdRng::seed_from_u64(0)).next();
    assert!(matches!(
        first,
        Some(Err(shards::ShardErr::InvalidLabel { value, .. })) if value == -1.0
    ));
}

#[test]
fn warm_cache_serves_the_same_table() {
    let dir = TempDir::new().unwrap();
    let shard = write_shard(dir.path(), "train_01.csv.gz", 0, 12);
    let cache = ShardCache::new(dir.path().join("cache2/train"), Schema::click_log());

    assert!(!cache.cache_path(&shard).exists());
    let cold = cache.load(&shard).unwrap();
    assert!(cache.cache_path(&shard).exists());
    let warm = cache.load(&shard).unwrap();

    assert_eq!(cold.names(), warm.names());
    assert_eq!(cold.len(), warm.len());
    for ((name, a), (_, b)) in cold.columns().zip(warm.columns()) {
        assert_eq!(a, b, "column {name}");
    }
    assert!(matches!(warm.column("click_time"), Some(Column::Text(_))));
}

#[test]
fn warm_cache_does_not_read_the_raw_shard() {
    let dir = TempDir::new().unwrap();
    let shard = write_shard(dir.path(), "train_01.csv.gz", 0, 12);
    let cache = ShardCache::new(dir.path().join("cache"), Schema::click_log());

    cache.load(&shard).unwrap();
    fs::remove_file(&shard).unwrap();

    assert_eq!(cache.load(&shard).unwrap().len(), 12);
    assert_eq!(cache.row_count(&shard).unwrap(), 12);
}

#[test]
fn corrupt_artifact_falls_back_to_the_raw_shard() {
    let dir = TempDir::new().unwrap();
    let shard = write_shard(dir.path(), "train_01.csv.gz", 0, 12);
    let cache = ShardCache::new(dir.path().join("cache"), Schema::click_log());
    let artifact = cache.cache_path(&shard);

    cache.load(&shard).unwrap();
    let good = fs::read(&artifact).unwrap();
    fs::write(&artifact, &good[..good.len() / 3]).unwrap();

    let table = cache.load(&shard).unwrap();
    assert_eq!(table.len(), 12);

    // The broken artifact was replaced by a readable one.
    fs::remove_file(&shard).unwrap();
    assert_eq!(cache.load(&shard).unwrap().len(), 12);
}

#[test]
fn missing_shard_is_fatal() {
    let dir = TempDir::new().unwrap();
    let src = source(dir.path(), 4);
    let mut producer = src.produce(
        vec![dir.path().join("nope.csv.gz")],
        false,
        StdRng::seed_from_u64(0),
    );

    assert!(matches!(producer.next(), Some(Err(shards::ShardErr::Io { .. }))));
    assert!(producer.next().is_none());
}

#[test]
fn stale_artifacts_follow_the_policy() {
    let dir = TempDir::new().unwrap();
    let shard = write_shard(dir.path(), "train_01.csv.gz", 0, 4);
    let cache_dir = dir.path().join("cache");

    ShardCache::new(&cache_dir, Schema::click_log())
        .load(&shard)
        .unwrap();
    // A different row count changes the shard's size, so its stamp moves.
    write_shard(dir.path(), "train_01.csv.gz", 0, 9);

    let ignore = ShardCache::new(&cache_dir, Schema::click_log())
        .with_stale_policy(StalePolicy::Ignore);
    assert_eq!(ignore.load(&shard).unwrap().len(), 4);

    let warn = ShardCache::new(&cache_dir, Schema::click_log());
    assert_eq!(warn.load(&shard).unwrap().len(), 4);

    let reparse = ShardCache::new(&cache_dir, Schema::click_log())
        .with_stale_policy(StalePolicy::Reparse);
    assert_eq!(reparse.load(&shard).unwrap().len(), 9);

    // The re-parse refreshed the artifact for everyone.
    assert_eq!(ignore.load(&shard).unwrap().len(), 9);
}

#[test]
fn invalidate_forces_a_reparse() {
    let dir = TempDir::new().unwrap();
    let shard = write_shard(dir.path(), "train_01.csv.gz", 0, 4);
    let cache = ShardCache::new(dir.path().join("cache"), Schema::click_log());

    cache.load(&shard).unwrap();
    assert!(cache.invalidate(&shard).unwrap());
    assert!(!cache.invalidate(&shard).unwrap());
    assert!(!cache.cache_path(&shard).exists());
}

#[test]
fn prefetching_preserves_the_sequence() {
    let dir = TempDir::new().unwrap();
    let paths = vec![
        write_shard(dir.path(), "a.csv.gz", 0, 13),
        write_shard(dir.path(), "b.csv.gz", 100, 8),
    ];
    let src = source(dir.path(), 3);

    let direct: Vec<Batch> = src
        .produce(paths.clone(), false, StdRng::seed_from_u64(9))
        .map(Result::unwrap)
        .collect();
    let prefetched: Vec<Batch> = Prefetcher::spawn(
        src.produce(paths, false, StdRng::seed_from_u64(9)),
        2,
    )
    .map(Result::unwrap)
    .collect();

    assert_eq!(direct, prefetched);
}

#[test]
fn text_label_column_is_rejected() {
    let dir = TempDir::new().unwrap();
    let shard = write_shard(dir.path(), "a.csv.gz", 0, 3);
    let cache = ShardCache::new(dir.path().join("cache"), Schema::click_log());
    let mut spec = features();
    spec.label = "click_time".into();
    let src = BatchSource::new(cache, spec, NonZeroUsize::new(2).unwrap());

    let first = src
        .produce(vec![shard], false, StdRng::seed_from_u64(0))
        .next();
    assert!(matches!(
        first,
        Some(Err(shards::ShardErr::NonNumericColumn { .. }))
    ));
}

#[test]
fn counting_matches_the_produced_rows_per_shard() {
    let dir = TempDir::new().unwrap();
    let sizes = HashMap::from([("a.csv.gz", 11usize), ("b.csv.gz", 3), ("c.csv.gz", 0)]);
    let mut names: Vec<&str> = sizes.keys().copied().collect();
    names.sort();
    let paths: Vec<PathBuf> = names
        .iter()
        .enumerate()
        .map(|(i, n)| write_shard(dir.path(), n, i * 1000, sizes[n]))
        .collect();

    let cache = ShardCache::new(dir.path().join("cache"), Schema::click_log());
    for (path, name) in paths.iter().zip(&names) {
        assert_eq!(cache.row_count(path).unwrap(), sizes[name]);
    }
}
