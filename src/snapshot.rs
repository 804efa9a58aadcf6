use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Raw shape of the plugin-produced state blob. The plugin owns the schema;
/// every field defaults so a partial or older blob never fails a cycle, and
/// unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateBlob {
    pub characters: Vec<CharacterRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CharacterRecord {
    pub submarines: Vec<SubmarineRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubmarineRecord {
    /// Unix epoch seconds; 0 means docked, not on a voyage
    pub return_time: u64,
}

/// What the monitor derives from one account's blob each cycle.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// Submarines whose return timestamp has passed
    pub ready: u32,
    /// Submarines still out on a voyage
    pub voyaging: u32,
    /// Time until the soonest future return, if any submarine is voyaging
    pub next_return_in: Option<Duration>,
    /// Modification time of the blob; advancing while the client runs is
    /// the productive-activity signal
    pub last_write: Option<SystemTime>,
}

impl StateBlob {
    pub fn observe(&self, now: SystemTime) -> Observation {
        let now_epoch = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut obs = Observation::default();
        let mut soonest: Option<u64> = None;
        for character in &self.characters {
            for submarine in &character.submarines {
                match submarine.return_time {
                    0 => {}
                    t if t <= now_epoch => obs.ready += 1,
                    t => {
                        obs.voyaging += 1;
                        soonest = Some(soonest.map_or(t, |s| s.min(t)));
                    }
                }
            }
        }
        obs.next_return_in = soonest.map(|t| Duration::from_secs(t - now_epoch));
        obs
    }
}

/// Read-only source of per-account observations.
pub trait StateSource {
    fn observe(&self, nickname: &str, now: SystemTime) -> Result<Observation>;
}

/// Reads `<state_dir>/<nickname>.json` fresh every cycle.
pub struct FileStateSource {
    dir: PathBuf,
}

impl FileStateSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl StateSource for FileStateSource {
    fn observe(&self, nickname: &str, now: SystemTime) -> Result<Observation> {
        let path = self.dir.join(format!("{nickname}.json"));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            // No blob yet: the plugin has not written for this account.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Observation::default())
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read state blob {}", path.display()))
            }
        };
        let blob: StateBlob = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse state blob {}", path.display()))?;

        let mut obs = blob.observe(now);
        obs.last_write = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(obs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(epoch: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(epoch)
    }

    #[test]
    fn counts_ready_and_voyaging() {
        let blob: StateBlob = serde_json::from_str(
            r#"{
                "characters": [{
                    "name": "Aster",
                    "submarines": [
                        {"name": "Sub-1", "return_time": 900},
                        {"name": "Sub-2", "return_time": 2000},
                        {"name": "Sub-3", "return_time": 1500},
                        {"name": "Sub-4", "return_time": 0}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let obs = blob.observe(at(1000));
        assert_eq!(obs.ready, 1);
        assert_eq!(obs.voyaging, 2);
        assert_eq!(obs.next_return_in, Some(Duration::from_secs(500)));
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let blob: StateBlob = serde_json::from_str(r#"{}"#).unwrap();
        let obs = blob.observe(at(1000));
        assert_eq!(obs.ready, 0);
        assert_eq!(obs.voyaging, 0);
        assert!(obs.next_return_in.is_none());

        // characters without a submarines key parse too
        let blob: StateBlob =
            serde_json::from_str(r#"{"characters": [{"name": "Aster"}]}"#).unwrap();
        assert_eq!(blob.observe(at(1000)).ready, 0);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let blob: StateBlob = serde_json::from_str(
            r#"{
                "version": 12,
                "characters": [{
                    "name": "Aster",
                    "world": "Ragnarok",
                    "gil": 123456,
                    "submarines": [
                        {"name": "Sub-1", "return_time": 500, "build": "SSUW"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let obs = blob.observe(at(1000));
        assert_eq!(obs.ready, 1);
    }

    #[test]
    fn missing_blob_file_is_an_empty_observation() {
        let source = FileStateSource::new(PathBuf::from("/nonexistent/subwatch-test"));
        let obs = source.observe("main", at(1000)).unwrap();
        assert_eq!(obs.ready, 0);
        assert!(obs.last_write.is_none());
    }
}
