use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use crate::color::ClassPalette;
use crate::data::aggregate::{average_spectra, ClassAverage};
use crate::data::bin::{bin_spectra, BinParams};
use crate::data::imzml::ImzmlFile;
use crate::data::model::{LabeledTable, MsiDataset};
use crate::data::table::{read_and_concat, write_table};

// ---------------------------------------------------------------------------
// Background work
// ---------------------------------------------------------------------------

/// What the app is doing right now. Load and bin run on a worker
/// thread so the display loop stays responsive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Loading { done: usize, total: usize },
    Binning,
}

/// Messages a worker thread sends back to the UI thread.
pub enum WorkerEvent {
    LoadProgress { done: usize, total: usize },
    Loaded(MsiDataset),
    Binned(LabeledTable),
    Failed(String),
}

// ---------------------------------------------------------------------------
// Parameter form
// ---------------------------------------------------------------------------

/// Raw text of the parameter entries, exactly as typed. Parsing and
/// validation happen when the user hits "Generate Matrix".
pub struct ParamEntries {
    pub class_label: String,
    pub mz_min: String,
    pub mz_max: String,
    pub bin_size: String,
    pub normalize: bool,
    pub log_transform: bool,
}

impl Default for ParamEntries {
    fn default() -> Self {
        Self {
            class_label: "Class".to_string(),
            mz_min: "600".to_string(),
            mz_max: "1000".to_string(),
            bin_size: "0.1".to_string(),
            normalize: false,
            log_transform: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering. The data layer holds no
/// session state; the current dataset and table live here and are
/// threaded through the pure transforms.
pub struct AppState {
    /// Loaded imzML run (None until a file is loaded). Shared with the
    /// binning worker, which only reads it.
    pub dataset: Option<Arc<MsiDataset>>,

    /// The current labeled table: freshly binned, or imported and
    /// concatenated.
    pub table: Option<LabeledTable>,

    /// Per-class mean curves of `table`, recomputed when it changes.
    pub averages: Vec<ClassAverage>,

    /// Plot x-positions of `table`'s bins, cached alongside `averages`.
    pub plot_positions: Vec<f64>,

    pub entries: ParamEntries,
    pub activity: Activity,

    /// Colours for the average-spectrum curves.
    pub palette: Option<ClassPalette>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,

    worker: Option<Receiver<WorkerEvent>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            dataset: None,
            table: None,
            averages: Vec::new(),
            plot_positions: Vec::new(),
            entries: ParamEntries::default(),
            activity: Activity::Idle,
            palette: None,
            status_message: None,
            worker: None,
        }
    }
}

impl AppState {
    pub fn busy(&self) -> bool {
        self.activity != Activity::Idle
    }

    /// Load an imzML file on a worker thread, streaming progress back.
    pub fn start_load(&mut self, path: PathBuf) {
        if self.busy() {
            return;
        }
        self.activity = Activity::Loading { done: 0, total: 0 };
        self.status_message = None;

        let (tx, rx) = mpsc::channel();
        self.worker = Some(rx);

        thread::spawn(move || {
            let file = match ImzmlFile::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    let _ = tx.send(WorkerEvent::Failed(format!("Failed to load file: {e}")));
                    return;
                }
            };
            let progress_tx = tx.clone();
            match file.read_all(move |done, total| {
                let _ = progress_tx.send(WorkerEvent::LoadProgress { done, total });
            }) {
                Ok(dataset) => {
                    let _ = tx.send(WorkerEvent::Loaded(dataset));
                }
                Err(e) => {
                    let _ = tx.send(WorkerEvent::Failed(format!("Failed to load file: {e}")));
                }
            }
        });
    }

    /// Validate the parameter form and bin the loaded spectra on a
    /// worker thread. Validation failures never start any work.
    pub fn start_binning(&mut self) {
        if self.busy() {
            return;
        }
        let Some(dataset) = self.dataset.clone() else {
            self.status_message = Some("Load an imzML file first.".to_string());
            return;
        };

        let params = match BinParams::from_entries(
            &self.entries.class_label,
            &self.entries.mz_min,
            &self.entries.mz_max,
            &self.entries.bin_size,
            self.entries.normalize,
            self.entries.log_transform,
        ) {
            Ok(params) => params,
            Err(e) => {
                log::error!("Rejected binning parameters: {e}");
                self.status_message = Some(format!("Error: {e}"));
                return;
            }
        };
        // Grid-shape problems are parameter errors too: reject before
        // any binning work begins.
        if let Err(e) = params.grid() {
            log::error!("Rejected binning parameters: {e}");
            self.status_message = Some(format!("Error: {e}"));
            return;
        }

        self.activity = Activity::Binning;
        self.status_message = None;

        let (tx, rx) = mpsc::channel();
        self.worker = Some(rx);

        thread::spawn(move || {
            let event = match bin_spectra(&dataset.spectra, &params) {
                Ok(table) => WorkerEvent::Binned(table),
                Err(e) => WorkerEvent::Failed(format!("Error: {e}")),
            };
            let _ = tx.send(event);
        });
    }

    /// Drain pending worker events. Called once per frame.
    pub fn poll_worker(&mut self) {
        let Some(rx) = &self.worker else {
            return;
        };

        let mut events = Vec::new();
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            self.worker = None;
        }

        for event in events {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::LoadProgress { done, total } => {
                if matches!(self.activity, Activity::Loading { .. }) {
                    self.activity = Activity::Loading { done, total };
                }
            }
            WorkerEvent::Loaded(dataset) => {
                log::info!(
                    "Loaded {} spectra from {}",
                    dataset.len(),
                    dataset.source.display()
                );
                self.status_message = Some(format!("{} spectra loaded.", dataset.len()));
                self.dataset = Some(Arc::new(dataset));
                self.activity = Activity::Idle;
            }
            WorkerEvent::Binned(table) => {
                log::info!(
                    "Generated matrix: {} rows × {} bins",
                    table.n_rows(),
                    table.n_bins()
                );
                self.status_message = Some(format!(
                    "Matrix generated: {} spectra, {} bins.",
                    table.n_rows(),
                    table.n_bins()
                ));
                self.set_table(table);
                self.activity = Activity::Idle;
            }
            WorkerEvent::Failed(message) => {
                log::error!("{message}");
                self.status_message = Some(message);
                self.activity = Activity::Idle;
            }
        }
    }

    /// Install a new table and rebuild everything derived from it.
    /// Nothing is replaced until the producing operation has succeeded.
    pub fn set_table(&mut self, table: LabeledTable) {
        self.averages = average_spectra(&table);
        self.plot_positions = table.bin_positions();
        self.palette = Some(ClassPalette::new(
            self.averages.iter().map(|avg| avg.class.clone()),
        ));
        self.table = Some(table);
    }

    /// Write the current table to `path` (CSV or XLSX by extension).
    pub fn export_table(&mut self, path: &Path) {
        let Some(table) = &self.table else {
            self.status_message = Some("No data to export.".to_string());
            return;
        };
        match write_table(path, table) {
            Ok(()) => {
                log::info!("Exported table to {}", path.display());
                self.status_message = Some(format!("Saved {}.", path.display()));
            }
            Err(e) => {
                log::error!("Export failed: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    /// Import previously exported tables and stack them. On any error
    /// the current table stays as it was.
    pub fn import_and_concat(&mut self, paths: &[PathBuf]) {
        match read_and_concat(paths) {
            Ok(table) => {
                log::info!(
                    "Imported and concatenated {} files: {} rows",
                    paths.len(),
                    table.n_rows()
                );
                self.status_message = Some(format!(
                    "{} files imported and concatenated ({} rows).",
                    paths.len(),
                    table.n_rows()
                ));
                self.set_table(table);
            }
            Err(e) => {
                log::error!("Import failed: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::LabeledRow;

    fn table(rows: &[(&str, &[f64])]) -> LabeledTable {
        LabeledTable {
            bin_labels: vec!["600.25".to_string(), "600.75".to_string()],
            rows: rows
                .iter()
                .map(|(class, values)| LabeledRow {
                    class: class.to_string(),
                    values: values.to_vec(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_set_table_rebuilds_derived_state() {
        let mut state = AppState::default();
        state.set_table(table(&[("A", &[1.0, 2.0]), ("B", &[3.0, 4.0])]));

        assert_eq!(state.averages.len(), 2);
        assert_eq!(state.plot_positions.len(), 2);
        assert!(state.palette.is_some());
        assert!(state.table.is_some());
    }

    #[test]
    fn test_binning_rejects_bad_entries_without_starting_work() {
        let mut state = AppState::default();
        state.dataset = Some(Arc::new(MsiDataset {
            spectra: Vec::new(),
            source: PathBuf::from("test.imzML"),
        }));
        state.entries.bin_size = "zero".to_string();

        state.start_binning();

        assert_eq!(state.activity, Activity::Idle);
        assert!(state.status_message.as_deref().unwrap().contains("bin size"));
        assert!(state.worker.is_none());
    }

    #[test]
    fn test_binning_rejects_inverted_range_without_starting_work() {
        let mut state = AppState::default();
        state.dataset = Some(Arc::new(MsiDataset {
            spectra: Vec::new(),
            source: PathBuf::from("test.imzML"),
        }));
        state.entries.mz_min = "1000".to_string();
        state.entries.mz_max = "600".to_string();

        state.start_binning();

        assert_eq!(state.activity, Activity::Idle);
        assert!(state.status_message.is_some());
    }

    #[test]
    fn test_failed_import_keeps_previous_table() {
        let mut state = AppState::default();
        let previous = table(&[("A", &[1.0, 2.0])]);
        state.set_table(previous.clone());

        state.import_and_concat(&[PathBuf::from("/nonexistent/never.csv")]);

        assert!(state.status_message.as_deref().unwrap().starts_with("Error"));
        assert_eq!(state.table, Some(previous));
    }

    #[test]
    fn test_binning_round_trip_through_worker() {
        let mut state = AppState::default();
        state.dataset = Some(Arc::new(MsiDataset {
            spectra: vec![crate::data::model::Spectrum {
                mz: vec![600.2],
                intensity: vec![10.0],
                position: (1, 1, 1),
            }],
            source: PathBuf::from("test.imzML"),
        }));
        state.entries.mz_min = "600".to_string();
        state.entries.mz_max = "601".to_string();
        state.entries.bin_size = "0.5".to_string();

        state.start_binning();
        assert_eq!(state.activity, Activity::Binning);

        // The worker is a real thread; wait for its single event.
        while state.busy() {
            state.poll_worker();
            std::thread::yield_now();
        }

        let table = state.table.as_ref().unwrap();
        assert_eq!(table.bin_labels, vec!["600.25", "600.75"]);
        assert!((table.rows[0].values[0] - 10.0).abs() < 1e-9);
    }
}
