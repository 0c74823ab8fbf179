use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

/// A finished timing channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRecord {
    pub channel: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// elapsed wall clock seconds
    pub delta: f64,
}

#[derive(Debug, Clone, Copy)]
struct Running {
    started: Instant,
    start_time: DateTime<Utc>,
}

/// Wall clock timings of named channels. Starting a channel that is already running
/// restarts it; each stop appends one record.
#[derive(Debug, Default)]
pub struct TimeLogger {
    channels: HashMap<String, Running>,
    records: Vec<TimingRecord>,
}

impl TimeLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, channel: &str) {
        if self.channels.contains_key(channel) {
            debug!("restarting timer for '{}'", channel);
        }
        self.channels.insert(
            channel.to_string(),
            Running {
                started: Instant::now(),
                start_time: Utc::now(),
            },
        );
    }

    pub fn stop(&mut self, channel: &str) {
        let running = match self.channels.remove(channel) {
            Some(running) => running,
            None => {
                debug!("timer '{}' was never started", channel);
                return;
            }
        };
        self.records.push(TimingRecord {
            channel: channel.to_string(),
            start_time: running.start_time,
            end_time: Utc::now(),
            delta: running.started.elapsed().as_secs_f64(),
        });
    }

    pub fn stop_all(&mut self) {
        let mut running = self.channels.keys().cloned().collect::<Vec<_>>();
        running.sort();
        for channel in running {
            self.stop(channel.as_str());
        }
    }

    pub fn is_running(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn report(&self) -> &[TimingRecord] {
        self.records.as_ref()
    }

    /// All recorded durations of `channel`, oldest first.
    pub fn delta(&self, channel: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.channel == channel)
            .map(|r| r.delta)
            .collect()
    }

    /// Writes the records as pretty printed JSON, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("cannot create timings file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.records)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}
