// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use criterion::{Criterion, criterion_group, criterion_main};
use rock_replay::{LogReader, LogWriter, ReplayResult, StreamType, Timestamp};
use std::{
    fs::File,
    hint::black_box,
    io::BufWriter,
    ops::ControlFlow,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::TempDir;

const PAYLOAD: [u8; 48] = [7; 48];

fn make_log(dir: &Path, samples: u32) -> ReplayResult<PathBuf> {
    let path = dir.join(format!("bench-{samples}.log"));
    let file = File::create(&path).map_err(rock_replay::error::Details::WriteBytes)?;
    let mut writer = LogWriter::new(BufWriter::new(file));
    for (id, name, type_name) in [
        (0, "imu.acceleration", "/base/Vector3d"),
        (1, "imu.orientation", "/base/Quaterniond"),
    ] {
        writer.write_stream_declaration(id, StreamType::Data, name, type_name, "", &[])?;
    }
    for i in 0..samples {
        let t = Timestamp::from_micros(i64::from(i) * 1_000);
        writer.write_sample(0, t, t, &PAYLOAD)?;
        writer.write_sample(1, t, t, &PAYLOAD[..32])?;
    }
    writer.into_inner()?;
    Ok(path)
}

fn fixture(samples: u32) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = make_log(dir.path(), samples).unwrap();
    (dir, path)
}

fn bench_open(c: &mut Criterion, samples: u32) {
    let (_dir, path) = fixture(samples);
    c.bench_function(&format!("open log with {samples} samples"), |b| {
        b.iter(|| black_box(LogReader::open(&path).unwrap()))
    });
}

fn bench_open_cached(c: &mut Criterion, samples: u32) {
    let (_dir, path) = fixture(samples);
    LogReader::builder(path.clone())
        .index_cache(true)
        .build()
        .unwrap();
    c.bench_function(&format!("open cached log with {samples} samples"), |b| {
        b.iter(|| {
            black_box(
                LogReader::builder(path.clone())
                    .index_cache(true)
                    .build()
                    .unwrap(),
            )
        })
    });
}

fn bench_export(c: &mut Criterion, samples: u32) {
    let (dir, path) = fixture(samples);
    let reader = LogReader::open(&path).unwrap();
    let destination = dir.path().join("export.log");
    c.bench_function(&format!("export {samples} samples"), |b| {
        b.iter(|| {
            reader
                .export_range(
                    "imu.acceleration",
                    0,
                    u64::from(samples),
                    &destination,
                    |_| ControlFlow::Continue(()),
                    || false,
                )
                .unwrap()
        })
    });
}

fn bench_random_access(c: &mut Criterion) {
    let (_dir, path) = fixture(10_000);
    let reader = LogReader::open(&path).unwrap();
    let mut stream = reader.open_stream("imu.orientation").unwrap();
    c.bench_function("decode 100 scattered samples", |b| {
        b.iter(|| {
            for i in (0..10_000).step_by(100) {
                black_box(stream.decoded_sample(i).unwrap());
            }
        })
    });
}

fn bench_open_1_000(c: &mut Criterion) {
    bench_open(c, 1_000);
}

fn bench_open_100_000(c: &mut Criterion) {
    bench_open(c, 100_000);
}

fn bench_open_cached_100_000(c: &mut Criterion) {
    bench_open_cached(c, 100_000);
}

fn bench_export_1_000(c: &mut Criterion) {
    bench_export(c, 1_000);
}

fn bench_export_100_000(c: &mut Criterion) {
    bench_export(c, 100_000);
}

criterion_group!(
    benches,
    bench_open_1_000,
    bench_export_1_000,
    bench_random_access,
);

criterion_group!(
    name = long_benches;
    config = Criterion::default().sample_size(20).measurement_time(Duration::from_secs(10));
    targets =
        bench_open_100_000,
        bench_open_cached_100_000,
        bench_export_100_000
);

criterion_main!(benches, long_benches);
