//! Periodic CPU temperature broadcast.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::relay::{RelayHub, ServerEvent};

/// Client marks the reading red above this.
pub const HOT_THRESHOLD_C: f64 = 65.0;

/// Parse a sysfs thermal reading (millidegrees Celsius).
pub fn parse_millidegrees(raw: &str) -> Result<f64, std::num::ParseIntError> {
    let milli: i64 = raw.trim().parse()?;
    #[allow(clippy::cast_precision_loss)]
    Ok(milli as f64 / 1000.0)
}

/// One decimal, as shown in the status bar.
pub fn format_celsius(celsius: f64) -> String {
    format!("{celsius:.1}")
}

pub async fn read_cpu_temp(path: &Path) -> anyhow::Result<f64> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(parse_millidegrees(&raw)?)
}

/// Broadcast `sys_status` every `interval_secs` until the task is aborted.
pub fn spawn_monitor(hub: RelayHub, config: &MonitorConfig) -> JoinHandle<()> {
    let path: PathBuf = config.thermal_path.clone();
    let period = Duration::from_secs(config.interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match read_cpu_temp(&path).await {
                Ok(celsius) => {
                    if celsius > HOT_THRESHOLD_C {
                        tracing::warn!(name: "monitor.hot", celsius, "CPU running hot");
                    }
                    hub.broadcast(ServerEvent::SysStatus {
                        cpu_temp: format_celsius(celsius),
                    });
                }
                Err(e) => {
                    tracing::warn!(name: "monitor.read_failed", path = %path.display(), error = %e, "Monitor error");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let c = parse_millidegrees("48234\n").unwrap();
        assert_eq!(format_celsius(c), "48.2");
        assert!(parse_millidegrees("hot").is_err());
    }

    #[tokio::test]
    async fn test_monitor_broadcasts_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp");
        std::fs::write(&path, "51500").unwrap();

        let hub = RelayHub::new();
        let mut rx = hub.subscribe();
        let config = MonitorConfig {
            enabled: true,
            thermal_path: path,
            interval_secs: 5,
        };
        let handle = spawn_monitor(hub, &config);

        // First tick fires immediately
        let event = rx.recv().await.unwrap();
        assert_eq!(event, ServerEvent::SysStatus { cpu_temp: "51.5".to_string() });
        handle.abort();
    }
}
