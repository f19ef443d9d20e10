//! Daily CSV archive writer.
//!
//! Once a day at the configured UTC hour, days that have aged past
//! `archive_days` are dumped to `output_dir` as CSV (optionally gzipped),
//! with a backfill window so a missed run catches up. Existing archive
//! files are never rewritten.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{error, info, warn};

use relaymon_config::ArchiveConfig;
use relaymon_core::Observation;

use crate::error::StoreError;
use crate::retention::LoopHandle;
use crate::store::ObservationStore;

/// Writes day-granularity observation archives.
pub struct ArchiveWriter {
    store: Arc<dyn ObservationStore>,
    config: ArchiveConfig,
}

impl ArchiveWriter {
    /// Create an archive writer over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObservationStore>, config: ArchiveConfig) -> Self {
        Self { store, config }
    }

    /// Spawn the daily loop, firing at `schedule_hour` UTC.
    #[must_use]
    pub fn spawn(self) -> LoopHandle {
        let (handle, mut stop, stopped) = LoopHandle::pair();
        let cron = croner::Cron::new(&format!("0 {} * * *", self.config.schedule_hour))
            .parse()
            .ok();
        tokio::spawn(async move {
            let Some(cron) = cron else {
                error!(
                    hour = self.config.schedule_hour,
                    "invalid archive schedule, archiver disabled"
                );
                let _ = stopped.send(());
                return;
            };
            info!(
                hour = self.config.schedule_hour,
                dir = %self.config.output_dir,
                "archive writer started"
            );
            loop {
                let now = Utc::now();
                let Ok(next) = cron.find_next_occurrence(&now, false) else {
                    error!("no next archive occurrence, archiver exiting");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    _ = &mut stop => break,
                }
                if let Err(e) = self.run_once().await {
                    error!(error = %e, "archive run failed");
                }
            }
            let _ = stopped.send(());
        });
        handle
    }

    /// Archive every eligible day that has no file yet, then prune old
    /// archives. Public so tests and operator tooling can invoke a run
    /// directly.
    pub async fn run_once(&self) -> Result<(), StoreError> {
        let out_dir = PathBuf::from(&self.config.output_dir);
        std::fs::create_dir_all(&out_dir).map_err(|e| StoreError::Archive(e.to_string()))?;

        let today = Utc::now().date_naive();
        // Eligible days: [today - archive_days - backfill_days + 1,
        // today - archive_days].
        for days_ago in self.config.archive_days
            ..self.config.archive_days + self.config.backfill_days
        {
            let day = today - chrono::Duration::days(i64::from(days_ago));
            let path = out_dir.join(self.file_name(day));
            if path.exists() {
                continue;
            }
            let rows = self.store.day_rows(day).await?;
            write_archive(&path, &rows, self.config.compress)?;
            info!(day = %day, rows = rows.len(), path = %path.display(), "archived day");
        }

        if self.config.keep_days > 0 {
            prune_old_archives(&out_dir, today, self.config.keep_days);
        }
        Ok(())
    }

    fn file_name(&self, day: NaiveDate) -> String {
        if self.config.compress {
            format!("observations-{day}.csv.gz")
        } else {
            format!("observations-{day}.csv")
        }
    }
}

/// Columns written for each observation.
const CSV_HEADER: &str =
    "provider,service,channel,model,timestamp,status,sub_status,http_status,latency_ms,error\n";

fn write_archive(path: &Path, rows: &[Observation], compress: bool) -> Result<(), StoreError> {
    let mut buf = String::with_capacity(rows.len() * 96 + CSV_HEADER.len());
    buf.push_str(CSV_HEADER);
    for obs in rows {
        let line = [
            csv_field(&obs.key.provider),
            csv_field(&obs.key.service),
            csv_field(&obs.key.channel),
            csv_field(&obs.key.model),
            obs.timestamp.to_rfc3339(),
            obs.status.code().to_string(),
            obs.sub_status.as_str().to_owned(),
            obs.http_status.map(|c| c.to_string()).unwrap_or_default(),
            obs.latency_ms.to_string(),
            csv_field(obs.error.as_deref().unwrap_or("")),
        ]
        .join(",");
        buf.push_str(&line);
        buf.push('\n');
    }

    let io_err = |e: std::io::Error| StoreError::Archive(format!("{}: {e}", path.display()));
    let file = std::fs::File::create(path).map_err(io_err)?;
    if compress {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(buf.as_bytes()).map_err(io_err)?;
        encoder.finish().map_err(io_err)?;
    } else {
        let mut file = file;
        file.write_all(buf.as_bytes()).map_err(io_err)?;
    }
    Ok(())
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_owned()
    }
}

/// Delete archive files whose embedded date is older than `keep_days`.
fn prune_old_archives(dir: &Path, today: NaiveDate, keep_days: u32) {
    let cutoff = today - chrono::Duration::days(i64::from(keep_days));
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(day) = archive_file_date(&name.to_string_lossy()) else {
            continue;
        };
        if day < cutoff
            && let Err(e) = std::fs::remove_file(entry.path())
        {
            warn!(path = %entry.path().display(), error = %e, "failed to prune archive");
        }
    }
}

/// Extract the date from `observations-YYYY-MM-DD.csv[.gz]`.
fn archive_file_date(name: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix("observations-")?;
    let date_part = rest.strip_suffix(".csv.gz").or_else(|| rest.strip_suffix(".csv"))?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
