// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use stonebus::{
    AppResult, BusConfig, CommitStrategy, Consumer, HandleError, OffsetStrategy,
    PartitionStrategy, Record, RecordMetadata, Topics,
};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file, built-in defaults if absent
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    #[arg(short, long, default_value = "demo")]
    pub topic: String,
    #[arg(short, long, default_value = "demo-group")]
    pub group: String,
    /// number of records to publish
    #[arg(short, long, default_value_t = 2_000)]
    pub records: usize,
    /// number of consumer threads in the group
    #[arg(long, default_value_t = 3)]
    pub consumers: usize,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
}

struct CountingConsumer {
    topic: String,
    group: String,
    handled: Arc<AtomicUsize>,
}

impl Consumer for CountingConsumer {
    fn group_name(&self) -> &str {
        &self.group
    }
    fn topic_name(&self) -> &str {
        &self.topic
    }
    fn offset_strategy(&self) -> OffsetStrategy {
        OffsetStrategy::Earliest
    }
    fn partition_strategy(&self) -> PartitionStrategy {
        PartitionStrategy::DividePartitions
    }
    fn commit_strategy(&self) -> CommitStrategy {
        CommitStrategy::CommitAfterProcessing
    }
    fn handle_records(&self, records: &[RecordMetadata]) -> Result<(), HandleError> {
        let valid = records
            .iter()
            .filter(|r| r.downcast::<usize, String>().is_some())
            .count();
        self.handled.fetch_add(valid, Ordering::Relaxed);
        Ok(())
    }
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() -> AppResult<()> {
    let commandline: CommandLine = CommandLine::parse();
    let _log_guard = stonebus::setup_tracing("logs", log_level(commandline.verbose))?;

    let config = match commandline.conf.as_ref() {
        Some(path) => BusConfig::set_up_config(PathBuf::from(path))?,
        None => BusConfig::default(),
    };
    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", config);
        return Ok(());
    }

    let topics = Topics::new(config)?;
    let handled = Arc::new(AtomicUsize::new(0));
    let mut threads = Vec::with_capacity(commandline.consumers);
    for _ in 0..commandline.consumers {
        let consumer: Arc<dyn Consumer> = Arc::new(CountingConsumer {
            topic: commandline.topic.clone(),
            group: commandline.group.clone(),
            handled: handled.clone(),
        });
        let mut consumption = topics.create_consumer_thread(consumer)?;
        consumption.start()?;
        threads.push(consumption);
    }

    let started = Instant::now();
    let records: Vec<Record> = (0..commandline.records)
        .map(|i| Record::new(commandline.topic.clone(), i % 64, format!("payload-{}", i)))
        .collect();
    for chunk in records.chunks(100) {
        topics.add_records(chunk.to_vec())?;
    }
    info!(
        "published {} records in {:?}",
        commandline.records,
        started.elapsed()
    );

    let deadline = Instant::now() + Duration::from_secs(30);
    while handled.load(Ordering::Relaxed) < commandline.records {
        if Instant::now() > deadline {
            warn!("gave up waiting for consumers");
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    println!(
        "handled {} of {} records in {:?}",
        handled.load(Ordering::Relaxed),
        commandline.records,
        started.elapsed()
    );

    let topic = topics.get_topic(&commandline.topic);
    if let Some(group) = topic.get_consumer_group(&commandline.group) {
        for partition in topic.partitions() {
            println!(
                "partition {}: latest offset {}, committed {:?}",
                partition.partition_id(),
                partition.latest_offset(),
                group.committed_offset(partition.partition_id())
            );
        }
    }

    for mut consumption in threads {
        if consumption.stop() {
            warn!("consumption thread {} did not stop in time", consumption.name());
        }
    }
    Ok(())
}
