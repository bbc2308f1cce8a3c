//! Process journal.
//!
//! Append-only JSON-lines log of rig state after notable transitions
//! (arm, homing complete, limit hit, duty change). One record per line:
//!
//! ```text
//! {"ts":1760870400.125,"state":"pump_sweep","ecm_v":12.02,"ecm_i_ma":0.0,...}
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::rig::RigSnapshot;

/// One journal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Wall-clock time [s since Unix epoch].
    pub ts: f64,
    /// Sequencer state label.
    pub state: String,
    /// ECM bus voltage [V].
    pub ecm_v: f64,
    /// ECM current [mA].
    pub ecm_i_ma: f64,
    /// Pump branch current [mA]; 0 without a pump channel.
    pub pump_i_ma: f64,
    /// Estimated flow [L/min].
    pub pump_lpm: f64,
    /// Applied pump duty [%].
    pub pump_duty: f64,
    /// Interlock armed.
    pub armed: bool,
    /// Axis homed.
    pub position_known: bool,
    /// Free text, including sensor degradation notes.
    pub note: String,
}

impl JournalRecord {
    /// Build a record from a snapshot, stamped now.
    pub fn from_snapshot(state: &str, snapshot: &RigSnapshot, note: &str) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let note = match (&snapshot.power.note, note.is_empty()) {
            (Some(sensor), true) => sensor.clone(),
            (Some(sensor), false) => format!("{note}; {sensor}"),
            (None, _) => note.to_string(),
        };

        Self {
            ts,
            state: state.to_string(),
            ecm_v: snapshot.power.ecm.bus_voltage_v,
            ecm_i_ma: snapshot.power.ecm.current_ma,
            pump_i_ma: snapshot.power.pump.map_or(0.0, |p| p.current_ma),
            pump_lpm: snapshot.flow_lpm,
            pump_duty: snapshot.pump.applied,
            armed: snapshot.interlock.relay_energized && !snapshot.interlock.estop_active,
            position_known: snapshot.axis.position_known,
            note,
        }
    }
}

/// Destination for journal records.
pub trait JournalSink {
    /// Append one record.
    fn append(&mut self, record: &JournalRecord) -> io::Result<()>;
}

// ─── JSON Lines File ────────────────────────────────────────────────

/// JSON-lines file, opened for append.
#[derive(Debug)]
pub struct JsonlJournal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlJournal {
    /// Open (or create) `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JournalSink for JsonlJournal {
    fn append(&mut self, record: &JournalRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

// ─── In-Memory ──────────────────────────────────────────────────────

/// Journal kept in memory.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    /// Appended records.
    pub records: Vec<JournalRecord>,
}

impl MemoryJournal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// State labels in order.
    pub fn states(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.state.as_str()).collect()
    }
}

impl JournalSink for MemoryJournal {
    fn append(&mut self, record: &JournalRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
