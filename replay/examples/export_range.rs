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

//! Lists the data streams of a log, or exports a range of one of them.
//!
//! ```text
//! cargo run --example export_range -- run.0.log
//! cargo run --example export_range -- run.0.log imu.acceleration 100 200 [destination]
//! ```
//!
//! Set `RUST_LOG=debug` to see skipped streams and samples.

use rock_replay::{ExportRequest, ExportWorker, LogReader, default_export_path};
use std::{path::PathBuf, sync::Arc, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(log_path) = args.first().map(PathBuf::from) else {
        return Err("usage: export_range <log> [<stream> <start> <end> [<destination>]]".into());
    };
    let reader = Arc::new(LogReader::builder(log_path.clone()).index_cache(true).build()?);

    let [_, stream_name, start, end, rest @ ..] = args.as_slice() else {
        let listing = serde_json::json!({
            "path": log_path,
            "streams": reader.list_data_streams(),
            "tasks": reader
                .catalog()
                .grouped_by_task()
                .into_iter()
                .map(|(task, ports)| {
                    let ports: Vec<_> = ports.into_iter().map(|port| port.port).collect();
                    (task, ports)
                })
                .collect::<std::collections::BTreeMap<_, _>>(),
        });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    };

    let start_index: u64 = start.parse()?;
    let end_index: u64 = end.parse()?;
    let destination = rest
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_export_path(&log_path, start_index, end_index));

    let total = reader.stream_index(stream_name)?.total_samples();
    let request = ExportRequest::builder()
        .stream_name(stream_name.as_str())
        .start_index(start_index)
        .end_index(end_index.min(total))
        .destination(destination.clone())
        .build();
    let worker = ExportWorker::builder(Arc::clone(&reader), request)
        .progress_interval(Duration::from_millis(250))
        .spawn()?;
    while !worker.is_finished() {
        if let Some(sample_index) = worker.progress() {
            eprint!("\rexporting sample {sample_index} of {stream_name}");
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    let written = worker.join()?;
    eprintln!();
    println!("wrote {written} samples to {}", destination.display());

    Ok(())
}
