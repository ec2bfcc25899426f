//! On-disk record channels and file layout of a trace directory.
//!
//! A staleness run writes four headerless CSV files next to the trace. Every
//! row starts with `object,created` so rows can be joined per incarnation
//! without depending on row order.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use lifetime_types::{LastUseRecord, SiteUpdateRecord, StalenessRecord, UnreachableRecord};

pub const STALENESS_TRACE: &str = "staleness-trace";
pub const LAST_USE_TRACE: &str = "lastuse-trace";
pub const UNREACHABLE_TRACE: &str = "unreachable-trace";
pub const SITE_UPDATE_TRACE: &str = "updiid-trace";
pub const SITE_STATS_FILE: &str = "siteStats.json";

/// One value per record channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet<T> {
    pub staleness: T,
    pub last_use: T,
    pub unreachable: T,
    pub site_updates: T,
}

impl<T> ChannelSet<T> {
    pub fn map<U>(self, mut f: impl FnMut(&'static str, T) -> Result<U>) -> Result<ChannelSet<U>> {
        Ok(ChannelSet {
            staleness: f(STALENESS_TRACE, self.staleness)?,
            last_use: f(LAST_USE_TRACE, self.last_use)?,
            unreachable: f(UNREACHABLE_TRACE, self.unreachable)?,
            site_updates: f(SITE_UPDATE_TRACE, self.site_updates)?,
        })
    }
}

impl ChannelSet<PathBuf> {
    /// Channel file paths inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            staleness: dir.join(STALENESS_TRACE),
            last_use: dir.join(LAST_USE_TRACE),
            unreachable: dir.join(UNREACHABLE_TRACE),
            site_updates: dir.join(SITE_UPDATE_TRACE),
        }
    }

    /// Channel paths the aggregator needs, failing if any is missing.
    pub fn existing(dir: &Path) -> Result<Self> {
        let paths = Self::in_dir(dir);
        let missing: Vec<&str> = [
            (LAST_USE_TRACE, &paths.last_use),
            (UNREACHABLE_TRACE, &paths.unreachable),
            (SITE_UPDATE_TRACE, &paths.site_updates),
        ]
        .into_iter()
        .filter(|(_, path)| !path.is_file())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            bail!(
                "missing record channel(s) {} in {}; run --staleness on this trace first",
                missing.join(", "),
                dir.display()
            );
        }
        Ok(paths)
    }
}

// ============================================================================
// Writing
// ============================================================================

/// The four output channels of a staleness run.
///
/// `csv::Writer` flushes on drop, so buffered rows reach disk on every exit
/// path; [`RecordChannels::flush`] surfaces the errors that drop would hide.
pub struct RecordChannels<W: Write> {
    writers: ChannelSet<csv::Writer<W>>,
}

impl RecordChannels<BufWriter<File>> {
    /// Create (truncating) the channel files in `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        let files = ChannelSet::in_dir(dir).map(|_, path| {
            File::create(&path)
                .map(BufWriter::new)
                .with_context(|| format!("Failed to create record channel {}", path.display()))
        })?;
        Ok(Self::from_writers(files))
    }
}

impl<W: Write> RecordChannels<W> {
    pub fn from_writers(writers: ChannelSet<W>) -> Self {
        let csv = |w: W| csv::WriterBuilder::new().has_headers(false).from_writer(w);
        Self {
            writers: ChannelSet {
                staleness: csv(writers.staleness),
                last_use: csv(writers.last_use),
                unreachable: csv(writers.unreachable),
                site_updates: csv(writers.site_updates),
            },
        }
    }

    pub fn write_staleness(&mut self, record: &StalenessRecord) -> Result<()> {
        write_row(&mut self.writers.staleness, STALENESS_TRACE, record)
    }

    pub fn write_last_use(&mut self, record: &LastUseRecord) -> Result<()> {
        write_row(&mut self.writers.last_use, LAST_USE_TRACE, record)
    }

    pub fn write_unreachable(&mut self, record: &UnreachableRecord) -> Result<()> {
        write_row(&mut self.writers.unreachable, UNREACHABLE_TRACE, record)
    }

    pub fn write_site_update(&mut self, record: &SiteUpdateRecord) -> Result<()> {
        write_row(&mut self.writers.site_updates, SITE_UPDATE_TRACE, record)
    }

    /// Flush every channel, even after one of them fails; the first error wins.
    pub fn flush(&mut self) -> Result<()> {
        let results = [
            (STALENESS_TRACE, self.writers.staleness.flush()),
            (LAST_USE_TRACE, self.writers.last_use.flush()),
            (UNREACHABLE_TRACE, self.writers.unreachable.flush()),
            (SITE_UPDATE_TRACE, self.writers.site_updates.flush()),
        ];
        for (name, result) in results {
            result.with_context(|| format!("Failed to flush {}", name))?;
        }
        Ok(())
    }

    /// Flush and hand back the underlying writers.
    pub fn into_inner(self) -> Result<ChannelSet<W>> {
        self.writers.map(|name, writer| {
            writer
                .into_inner()
                .map_err(|e| anyhow!("Failed to flush {}: {}", name, e.error()))
        })
    }
}

fn write_row<W: Write, T: Serialize>(writer: &mut csv::Writer<W>, name: &str, record: &T) -> Result<()> {
    writer
        .serialize(record)
        .with_context(|| format!("Failed to write {} record", name))
}

// ============================================================================
// Reading
// ============================================================================

/// Read every row of a headerless channel file.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_records_from(file, &path.display().to_string())
}

pub fn read_records_from<T: DeserializeOwned, R: Read>(reader: R, origin: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(reader);
    let mut records = Vec::new();
    for (i, row) in reader.deserialize().enumerate() {
        let record = row.with_context(|| format!("Invalid record {} in {}", i + 1, origin))?;
        records.push(record);
    }
    Ok(records)
}

// ============================================================================
// Summary documents
// ============================================================================

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Write a file atomically (write to .tmp, then rename).
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write temp file {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path).with_context(|| {
        format!("Failed to rename {} to {}", tmp_path.display(), path.display())
    })?;
    Ok(())
}

/// Write a pretty-printed JSON document atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value).context("Failed to serialize JSON")?;
    json.push(b'\n');
    atomic_write(path, &json)
}
