//! Background resource sampling with threshold alerts.

use super::MetricsProvider;
use crate::config::EngineConfig;
use crate::core::ResourceSample;
use crossbeam::channel::{unbounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResourceAlert {
    pub message: String,
    pub sample: ResourceSample,
}

/// Samples the provider on a fixed interval from a background thread and
/// emits an alert whenever memory or disk crosses its critical threshold.
pub struct ResourceWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    alerts: Receiver<ResourceAlert>,
}

impl ResourceWatcher {
    pub fn spawn(
        provider: Arc<dyn MetricsProvider>,
        config: &EngineConfig,
        interval: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = unbounded();
        let memory_critical = config.memory_critical_pct;
        let disk_critical = config.disk_critical_pct;

        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                let sample = provider.sample();
                if sample.memory_pct >= memory_critical {
                    let _ = tx.send(ResourceAlert {
                        message: format!("memory at {:.1}%", sample.memory_pct),
                        sample,
                    });
                }
                if sample.disk_pct >= disk_critical {
                    let _ = tx.send(ResourceAlert {
                        message: format!("disk at {:.1}%", sample.disk_pct),
                        sample,
                    });
                }
                std::thread::sleep(interval);
            }
        });

        Self {
            stop,
            handle: Some(handle),
            alerts: rx,
        }
    }

    pub fn alerts(&self) -> &Receiver<ResourceAlert> {
        &self.alerts
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResourceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::StaticMetricsProvider;

    #[test]
    fn watcher_alerts_on_critical_disk() {
        let provider = Arc::new(StaticMetricsProvider {
            cpu_pct: 5.0,
            memory_pct: 20.0,
            disk_pct: 99.0,
        });
        let config = EngineConfig::default();
        let mut watcher =
            ResourceWatcher::spawn(provider, &config, Duration::from_millis(10));

        let alert = watcher
            .alerts()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert!(alert.message.contains("disk"));
        watcher.stop();
    }

    #[test]
    fn watcher_stays_quiet_when_healthy() {
        let provider = Arc::new(StaticMetricsProvider::healthy());
        let config = EngineConfig::default();
        let mut watcher =
            ResourceWatcher::spawn(provider, &config, Duration::from_millis(10));

        assert!(watcher
            .alerts()
            .recv_timeout(Duration::from_millis(100))
            .is_err());
        watcher.stop();
    }
}
