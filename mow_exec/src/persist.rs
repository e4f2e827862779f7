//! # Persistence
//!
//! Loading and saving of the settings, fault counters and lifetime
//! statistics. Only used at startup and on explicit save, never from the
//! loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use crate::fault::FaultRecord;
use crate::params::MowerParams;
use util::params as param_file;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const SETTINGS_FILE: &str = "settings.toml";
const FAULT_COUNTERS_FILE: &str = "fault_counters.json";
const TOTALS_FILE: &str = "totals.json";

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Non-volatile storage for the robot.
pub trait Persistence {
    fn load_settings(&self) -> Result<MowerParams, PersistError>;
    fn save_settings(&self, params: &MowerParams) -> Result<(), PersistError>;

    fn load_fault_counters(&self) -> Result<Vec<FaultRecord>, PersistError>;
    fn save_fault_counters(&self, records: &[FaultRecord]) -> Result<(), PersistError>;

    fn load_totals(&self) -> Result<RobotTotals, PersistError>;
    fn save_totals(&self, totals: &RobotTotals) -> Result<(), PersistError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Lifetime statistics kept across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotTotals {
    pub mow_time_total_min: f64,
    pub total_capacity_mah: f64,
    pub charging_sessions: u32,
}

/// Persistence to files in a directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Where the parameters were loaded from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamsSource {
    /// The persisted settings store
    Store,

    /// The parameter file, the store was empty or unreadable
    File {
        store_err: Option<String>
    },

    /// Neither could be loaded
    Defaults {
        store_err: Option<String>,
        file_err: String
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Nothing stored at {0:?}")]
    NotFound(PathBuf),

    #[error("Cannot access {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Cannot read the stored settings: {0}")]
    Settings(param_file::LoadError),

    #[error("Cannot serialise the settings: {0}")]
    SettingsSer(toml::ser::Error),

    #[error("Cannot read or write {0:?}: {1}")]
    Json(PathBuf, serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl FilePersistence {
    /// Store files in `dir`, which is created on the first save.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn write(&self, file: &str, contents: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| PersistError::Io(self.dir.clone(), e))?;

        let path = self.path(file);
        fs::write(&path, contents).map_err(|e| PersistError::Io(path.clone(), e))?;
        info!("Saved {:?}", path);

        Ok(())
    }

    fn read(&self, file: &str) -> Result<String, PersistError> {
        let path = self.path(file);
        if !path.exists() {
            return Err(PersistError::NotFound(path));
        }
        fs::read_to_string(&path).map_err(|e| PersistError::Io(path, e))
    }

    fn load_json<T>(&self, file: &str) -> Result<T, PersistError>
    where
        T: serde::de::DeserializeOwned
    {
        let s = self.read(file)?;
        serde_json::from_str(&s).map_err(|e| PersistError::Json(self.path(file), e))
    }

    fn save_json<T: Serialize>(&self, file: &str, data: &T) -> Result<(), PersistError> {
        let s = serde_json::to_string_pretty(data)
            .map_err(|e| PersistError::Json(self.path(file), e))?;
        self.write(file, &s)
    }
}

impl Persistence for FilePersistence {
    fn load_settings(&self) -> Result<MowerParams, PersistError> {
        let path = self.path(SETTINGS_FILE);
        if !path.exists() {
            return Err(PersistError::NotFound(path));
        }
        param_file::load_path(path).map_err(PersistError::Settings)
    }

    fn save_settings(&self, params: &MowerParams) -> Result<(), PersistError> {
        let s = toml::to_string(params).map_err(PersistError::SettingsSer)?;
        self.write(SETTINGS_FILE, &s)
    }

    fn load_fault_counters(&self) -> Result<Vec<FaultRecord>, PersistError> {
        self.load_json(FAULT_COUNTERS_FILE)
    }

    fn save_fault_counters(&self, records: &[FaultRecord]) -> Result<(), PersistError> {
        self.save_json(FAULT_COUNTERS_FILE, &records)
    }

    fn load_totals(&self) -> Result<RobotTotals, PersistError> {
        self.load_json(TOTALS_FILE)
    }

    fn save_totals(&self, totals: &RobotTotals) -> Result<(), PersistError> {
        self.save_json(TOTALS_FILE, totals)
    }
}

impl ParamsSource {
    /// The parameters came from a fallback after something was unreadable.
    pub fn is_fault(&self) -> bool {
        match self {
            ParamsSource::Store => false,
            ParamsSource::File { store_err } => store_err.is_some(),
            ParamsSource::Defaults { .. } => true
        }
    }

    /// The store was empty and the parameter file loaded, so the store can be
    /// seeded from it.
    pub fn should_seed_store(&self) -> bool {
        *self == ParamsSource::File { store_err: None }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Load the parameters from `store`, falling back to `file` and then to the
/// defaults.
pub fn load_params<P, F, E>(store: &P, file: F) -> (MowerParams, ParamsSource)
where
    P: Persistence + ?Sized,
    F: FnOnce() -> Result<MowerParams, E>,
    E: Display
{
    let store_err = match store.load_settings() {
        Ok(params) => return (params, ParamsSource::Store),
        Err(PersistError::NotFound(_)) => None,
        Err(e) => Some(e.to_string())
    };

    match file() {
        Ok(params) => (params, ParamsSource::File { store_err }),
        Err(e) => (
            MowerParams::default(),
            ParamsSource::Defaults { store_err, file_err: e.to_string() }
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fault::{FaultKind, FaultRegistry};

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = FilePersistence::new(dir.path().join("store"));

        assert!(matches!(p.load_settings(), Err(PersistError::NotFound(_))));
        assert!(matches!(p.load_fault_counters(), Err(PersistError::NotFound(_))));
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = FilePersistence::new(dir.path());

        let mut params = MowerParams::default();
        params.perimeter.debounce_samples = 9;
        params.battery.switch_off_if_below = 20.5;

        p.save_settings(&params).unwrap();
        let loaded = p.load_settings().unwrap();

        assert_eq!(loaded.perimeter.debounce_samples, 9);
        assert_eq!(loaded.battery.switch_off_if_below, 20.5);
        assert_eq!(loaded.fault_thresholds, params.fault_thresholds);
    }

    #[test]
    fn test_stored_settings_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let p = FilePersistence::new(dir.path());

        let mut file_params = MowerParams::default();
        file_params.perimeter.debounce_samples = 7;

        // Empty store, the file is used and may seed the store
        let (params, source) = load_params(&p, || Ok::<_, String>(file_params.clone()));
        assert_eq!(params.perimeter.debounce_samples, 7);
        assert!(source.should_seed_store());
        assert!(!source.is_fault());
        p.save_settings(&params).unwrap();

        // The stored copy wins over a changed file
        file_params.perimeter.debounce_samples = 11;
        let (params, source) = load_params(&p, || Ok::<_, String>(file_params.clone()));
        assert_eq!(source, ParamsSource::Store);
        assert_eq!(params.perimeter.debounce_samples, 7);
    }

    #[test]
    fn test_unreadable_settings_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "not = [toml").unwrap();
        let p = FilePersistence::new(dir.path());

        let (params, source) = load_params(&p, || Ok::<_, String>(MowerParams::default()));
        assert!(matches!(source, ParamsSource::File { store_err: Some(_) }));
        assert!(source.is_fault());
        assert!(!source.should_seed_store());
        assert_eq!(params.perimeter.debounce_samples, MowerParams::default().perimeter.debounce_samples);

        let (_, source) = load_params(&p, || Err("no file"));
        match source {
            ParamsSource::Defaults { store_err, file_err } => {
                assert!(store_err.is_some());
                assert_eq!(file_err, "no file");
            },
            s => panic!("Unexpected source {:?}", s)
        }
    }

    #[test]
    fn test_fault_counters_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = FilePersistence::new(dir.path());

        let mut reg = FaultRegistry::new();
        reg.record(FaultKind::Charger);
        reg.record(FaultKind::Charger);
        reg.periodic_reset();

        p.save_fault_counters(&reg.to_records()).unwrap();
        let restored = FaultRegistry::from_records(&p.load_fault_counters().unwrap());

        assert_eq!(restored.get(FaultKind::Charger).max_count_seen, 2);
        assert_eq!(restored.get(FaultKind::Charger).count_since_reset, 0);
    }

    #[test]
    fn test_corrupt_counters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FAULT_COUNTERS_FILE), "not json").unwrap();

        let p = FilePersistence::new(dir.path());
        assert!(matches!(p.load_fault_counters(), Err(PersistError::Json(..))));
    }
}
