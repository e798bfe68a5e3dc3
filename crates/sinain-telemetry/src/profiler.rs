//! Profiler — gauges, named timers, process sampling, external snapshots
//!
//! Two aggregate types: last-write-wins gauges and per-name timer stats.
//! A background task samples process memory/CPU every 10s and observes
//! runtime lag as timer drift over a 100ms interval, reset each sample.
//! External processes (screen client, overlay) report their own snapshots
//! over HTTP/WS; each is exposed as `null` until the first report.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(10);
const LAG_PROBE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct TimerStat {
    pub count: u64,
    #[serde(rename = "totalMs")]
    pub total_ms: f64,
    #[serde(rename = "lastMs")]
    pub last_ms: f64,
    #[serde(rename = "maxMs")]
    pub max_ms: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
struct LagSample {
    #[serde(rename = "meanMs")]
    mean_ms: f64,
    #[serde(rename = "maxMs")]
    max_ms: f64,
}

#[derive(Default)]
struct LagWindow {
    sum_ms: f64,
    count: u64,
    max_ms: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
struct ProcessSample {
    #[serde(rename = "rssMb")]
    rss_mb: f64,
    #[serde(rename = "cpuPct")]
    cpu_pct: f64,
}

pub struct Profiler {
    started_at: Instant,
    gauges: Mutex<HashMap<String, f64>>,
    timers: Mutex<HashMap<String, TimerStat>>,
    lag: Mutex<LagWindow>,
    last_lag: Mutex<LagSample>,
    process: Mutex<Option<ProcessSample>>,
    sense_client: Mutex<Option<serde_json::Value>>,
    overlay: Mutex<Option<serde_json::Value>>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            gauges: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            lag: Mutex::new(LagWindow::default()),
            last_lag: Mutex::new(LagSample::default()),
            process: Mutex::new(None),
            sense_client: Mutex::new(None),
            overlay: Mutex::new(None),
        }
    }

    pub fn gauge(&self, name: &str, value: f64) {
        self.gauges.lock().unwrap().insert(name.to_string(), value);
    }

    pub fn timer_record(&self, name: &str, d_ms: f64) {
        let mut timers = self.timers.lock().unwrap();
        let stat = timers.entry(name.to_string()).or_default();
        stat.count += 1;
        stat.total_ms += d_ms;
        stat.last_ms = d_ms;
        if d_ms > stat.max_ms {
            stat.max_ms = d_ms;
        }
    }

    /// Time an async operation under `name`.
    pub async fn time_async<T, F>(&self, name: &str, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let start = Instant::now();
        let out = fut.await;
        self.timer_record(name, start.elapsed().as_secs_f64() * 1000.0);
        out
    }

    pub fn timer(&self, name: &str) -> Option<TimerStat> {
        self.timers.lock().unwrap().get(name).copied()
    }

    pub fn gauge_value(&self, name: &str) -> Option<f64> {
        self.gauges.lock().unwrap().get(name).copied()
    }

    /// Record one runtime-lag observation (timer overshoot).
    pub fn observe_lag(&self, lag_ms: f64) {
        let mut lag = self.lag.lock().unwrap();
        lag.sum_ms += lag_ms;
        lag.count += 1;
        if lag_ms > lag.max_ms {
            lag.max_ms = lag_ms;
        }
    }

    /// Fold the current lag window into the exposed sample and reset it.
    pub fn roll_lag_window(&self) {
        let mut lag = self.lag.lock().unwrap();
        let sample = LagSample {
            mean_ms: if lag.count > 0 {
                lag.sum_ms / lag.count as f64
            } else {
                0.0
            },
            max_ms: lag.max_ms,
        };
        *lag = LagWindow::default();
        drop(lag);
        *self.last_lag.lock().unwrap() = sample;
    }

    pub fn set_sense_client_snapshot(&self, snapshot: serde_json::Value) {
        *self.sense_client.lock().unwrap() = Some(snapshot);
    }

    pub fn set_overlay_snapshot(&self, snapshot: serde_json::Value) {
        *self.overlay.lock().unwrap() = Some(snapshot);
    }

    /// Combined snapshot for /health and profiling pushes.
    pub fn snapshot(&self) -> serde_json::Value {
        let process = self.process.lock().unwrap().unwrap_or_default();
        let lag = *self.last_lag.lock().unwrap();
        let gauges = self.gauges.lock().unwrap().clone();
        let timers = self.timers.lock().unwrap().clone();
        let sense_client = self.sense_client.lock().unwrap().clone();
        let overlay = self.overlay.lock().unwrap().clone();
        serde_json::json!({
            "uptimeS": self.started_at.elapsed().as_secs(),
            "process": process,
            "loopLag": lag,
            "gauges": gauges,
            "timers": timers,
            "senseClient": sense_client,
            "overlay": overlay,
        })
    }

    fn sample_process(&self, sys: &mut System) {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return;
        };
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if let Some(proc) = sys.process(pid) {
            let sample = ProcessSample {
                rss_mb: proc.memory() as f64 / (1024.0 * 1024.0),
                cpu_pct: proc.cpu_usage() as f64,
            };
            *self.process.lock().unwrap() = Some(sample);
        }
    }

    /// Spawn the 10s process sampler and the 100ms lag probe. Both stop on
    /// cancellation.
    pub fn spawn_sampling(self: Arc<Self>, cancel: CancellationToken) {
        let profiler = self.clone();
        let sampler_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut sys = System::new();
            let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = sampler_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        profiler.sample_process(&mut sys);
                        profiler.roll_lag_window();
                    }
                }
            }
        });

        let profiler = self;
        tokio::spawn(async move {
            let mut last = Instant::now();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(LAG_PROBE_INTERVAL) => {
                        let elapsed = last.elapsed();
                        last = Instant::now();
                        let overshoot =
                            elapsed.as_secs_f64() * 1000.0 - LAG_PROBE_INTERVAL.as_millis() as f64;
                        profiler.observe_lag(overshoot.max(0.0));
                    }
                }
            }
        });
    }
}
