//! Resource gating: coarse device metrics mapped to a state that limits task admission.
//!
//! Classification is a pure function of the last metrics ([`classify`]); the manager only
//! remembers the result. The CPU figure from [`SystemProbe`] is an estimate derived from memory
//! pressure and the battery level is a configured constant; neither is a live measurement.

use crate::config::ResourceThresholds;
use crate::error::{SallieError, SallieResult};
use crate::tasks::TaskPriority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use sysinfo::System;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Normal,
    Constrained,
    Critical,
    LowBattery,
    Unknown,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Normal => "normal",
            ResourceState::Constrained => "constrained",
            ResourceState::Critical => "critical",
            ResourceState::LowBattery => "low_battery",
            ResourceState::Unknown => "unknown",
        }
    }

    /// Least urgent priority still admitted in this state.
    pub fn priority_ceiling(&self) -> TaskPriority {
        match self {
            ResourceState::Normal => TaskPriority::Background,
            ResourceState::Constrained | ResourceState::LowBattery | ResourceState::Unknown => {
                TaskPriority::Normal
            }
            ResourceState::Critical => TaskPriority::Critical,
        }
    }

    pub fn admits(&self, priority: TaskPriority) -> bool {
        priority.value() <= self.priority_ceiling().value()
    }
}

/// Ratios in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub memory_usage: f32,
    pub cpu_usage: f32,
    pub battery_level: f32,
    pub captured_at: DateTime<Utc>,
}

impl ResourceMetrics {
    pub fn new(memory_usage: f32, cpu_usage: f32, battery_level: f32) -> Self {
        Self {
            memory_usage: unit(memory_usage),
            cpu_usage: unit(cpu_usage),
            battery_level: unit(battery_level),
            captured_at: Utc::now(),
        }
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Critical pressure, then high pressure, then low battery, else normal.
/// Usage must exceed a threshold to count; a reading exactly on it does not.
pub fn classify(metrics: &ResourceMetrics, thresholds: &ResourceThresholds) -> ResourceState {
    if metrics.memory_usage > thresholds.memory_critical || metrics.cpu_usage > thresholds.cpu_critical {
        ResourceState::Critical
    } else if metrics.memory_usage > thresholds.memory_high || metrics.cpu_usage > thresholds.cpu_high {
        ResourceState::Constrained
    } else if metrics.battery_level < thresholds.battery_low {
        ResourceState::LowBattery
    } else {
        ResourceState::Normal
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

pub trait MetricsProbe: Send + Sync {
    fn sample(&self) -> SallieResult<ResourceMetrics>;
}

/// Host metrics via `sysinfo`.
pub struct SystemProbe {
    sys: Mutex<System>,
    battery_level: f32,
}

impl SystemProbe {
    pub fn new(battery_level: f32) -> Self {
        Self {
            sys: Mutex::new(System::new()),
            battery_level,
        }
    }
}

impl MetricsProbe for SystemProbe {
    fn sample(&self) -> SallieResult<ResourceMetrics> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|e| SallieError::Lock(format!("system probe: {}", e)))?;
        sys.refresh_memory();
        let total = sys.total_memory();
        let memory = if total == 0 {
            0.0
        } else {
            sys.used_memory() as f32 / total as f32
        };
        // Estimate: CPU load tracks memory pressure.
        let cpu = 0.2 + memory * 0.6;
        Ok(ResourceMetrics::new(memory, cpu, self.battery_level))
    }
}

/// Returns whatever was last set. For tests and simulations.
pub struct FixedProbe {
    metrics: RwLock<ResourceMetrics>,
}

impl FixedProbe {
    pub fn new(metrics: ResourceMetrics) -> Self {
        Self {
            metrics: RwLock::new(metrics),
        }
    }

    pub fn set(&self, metrics: ResourceMetrics) {
        *self.metrics.write().unwrap_or_else(PoisonError::into_inner) = metrics;
    }
}

impl MetricsProbe for FixedProbe {
    fn sample(&self) -> SallieResult<ResourceMetrics> {
        Ok(*self.metrics.read().unwrap_or_else(PoisonError::into_inner))
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct Observed {
    state: ResourceState,
    metrics: Option<ResourceMetrics>,
}

pub struct ResourceManager {
    thresholds: ResourceThresholds,
    probe: Arc<dyn MetricsProbe>,
    observed: RwLock<Observed>,
}

impl ResourceManager {
    pub fn new(thresholds: ResourceThresholds, probe: Arc<dyn MetricsProbe>) -> Self {
        Self {
            thresholds,
            probe,
            observed: RwLock::new(Observed {
                state: ResourceState::Unknown,
                metrics: None,
            }),
        }
    }

    pub fn thresholds(&self) -> &ResourceThresholds {
        &self.thresholds
    }

    pub fn state(&self) -> ResourceState {
        self.observed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn last_metrics(&self) -> Option<ResourceMetrics> {
        self.observed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .metrics
    }

    /// Stores `metrics` and returns the state they classify to.
    pub fn update_metrics(&self, metrics: ResourceMetrics) -> ResourceState {
        let next = classify(&metrics, &self.thresholds);
        let mut observed = self.observed.write().unwrap_or_else(PoisonError::into_inner);
        let previous = observed.state;
        observed.state = next;
        observed.metrics = Some(metrics);
        drop(observed);

        if previous != next {
            info!(
                target: "sallie::resources",
                from = previous.as_str(),
                to = next.as_str(),
                memory = metrics.memory_usage,
                cpu = metrics.cpu_usage,
                battery = metrics.battery_level,
                "resource state changed"
            );
        }
        next
    }

    /// Samples the probe and reclassifies.
    pub fn refresh(&self) -> SallieResult<ResourceState> {
        let metrics = self.probe.sample()?;
        Ok(self.update_metrics(metrics))
    }

    pub fn can_execute_task(&self, priority: TaskPriority) -> bool {
        self.state().admits(priority)
    }

    /// Polls the probe every `interval` until `shutdown` turns true or its sender drops.
    pub fn spawn_monitor(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        info!(
            target: "sallie::resources",
            interval_ms = interval.as_millis() as u64,
            "resource monitor started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match manager.refresh() {
                            Ok(state) => debug!(target: "sallie::resources", state = state.as_str(), "resource tick"),
                            Err(e) => warn!(target: "sallie::resources", error = %e, "resource sample failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(target: "sallie::resources", "resource monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(metrics: ResourceMetrics) -> (ResourceManager, Arc<FixedProbe>) {
        let probe = Arc::new(FixedProbe::new(metrics));
        (
            ResourceManager::new(ResourceThresholds::default(), probe.clone()),
            probe,
        )
    }

    #[test]
    fn test_classification_priority_order() {
        let t = ResourceThresholds::default();
        assert_eq!(classify(&ResourceMetrics::new(0.95, 0.1, 0.05), &t), ResourceState::Critical);
        assert_eq!(classify(&ResourceMetrics::new(0.5, 0.8, 0.05), &t), ResourceState::Constrained);
        assert_eq!(classify(&ResourceMetrics::new(0.5, 0.3, 0.05), &t), ResourceState::LowBattery);
        assert_eq!(classify(&ResourceMetrics::new(0.5, 0.3, 0.9), &t), ResourceState::Normal);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let t = ResourceThresholds::default();
        assert_eq!(classify(&ResourceMetrics::new(t.memory_high, 0.1, 0.9), &t), ResourceState::Normal);
        assert_eq!(classify(&ResourceMetrics::new(0.81, 0.1, 0.9), &t), ResourceState::Constrained);
        assert_eq!(classify(&ResourceMetrics::new(0.5, t.cpu_high, 0.9), &t), ResourceState::Normal);
        assert_eq!(
            classify(&ResourceMetrics::new(t.memory_critical, 0.1, 0.9), &t),
            ResourceState::Constrained
        );
        assert_eq!(classify(&ResourceMetrics::new(0.91, 0.1, 0.9), &t), ResourceState::Critical);
        assert_eq!(classify(&ResourceMetrics::new(0.5, 0.3, t.battery_low), &t), ResourceState::Normal);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let (manager, _) = manager(ResourceMetrics::new(0.85, 0.2, 0.9));
        let m = ResourceMetrics::new(0.85, 0.2, 0.9);
        assert_eq!(manager.update_metrics(m), ResourceState::Constrained);
        assert_eq!(manager.update_metrics(m), ResourceState::Constrained);
        assert_eq!(manager.state(), ResourceState::Constrained);
    }

    #[test]
    fn test_admission_ceilings() {
        let (manager, probe) = manager(ResourceMetrics::new(0.1, 0.1, 0.9));
        assert_eq!(manager.state(), ResourceState::Unknown);
        assert!(manager.can_execute_task(TaskPriority::Normal));
        assert!(!manager.can_execute_task(TaskPriority::Low));

        manager.refresh().unwrap();
        assert!(manager.can_execute_task(TaskPriority::Background));

        probe.set(ResourceMetrics::new(0.95, 0.1, 0.9));
        assert_eq!(manager.refresh().unwrap(), ResourceState::Critical);
        assert!(manager.can_execute_task(TaskPriority::Critical));
        assert!(!manager.can_execute_task(TaskPriority::High));
    }

    #[test]
    fn test_system_probe_reports_ratios() {
        let metrics = SystemProbe::new(0.8).sample().unwrap();
        assert!((0.0..=1.0).contains(&metrics.memory_usage));
        assert!((0.0..=1.0).contains(&metrics.cpu_usage));
        assert_eq!(metrics.battery_level, 0.8);
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let (manager, _) = manager(ResourceMetrics::new(0.1, 0.1, 0.9));
        let manager = Arc::new(manager);
        let (tx, rx) = watch::channel(false);
        let handle = manager.spawn_monitor(Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(manager.state(), ResourceState::Normal);
    }
}
