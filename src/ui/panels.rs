use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use crate::state::{Activity, AppState};

// ---------------------------------------------------------------------------
// Left side panel – parameters and actions
// ---------------------------------------------------------------------------

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Binning");
    ui.separator();

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            labeled_entry(ui, "Class Name", &mut state.entries.class_label);
            labeled_entry(ui, "Min m/z", &mut state.entries.mz_min);
            labeled_entry(ui, "Max m/z", &mut state.entries.mz_max);
            labeled_entry(ui, "Bin Size", &mut state.entries.bin_size);

            ui.checkbox(&mut state.entries.normalize, "Normalize");
            ui.checkbox(&mut state.entries.log_transform, "Log Transform");
            ui.add_space(6.0);

            let can_bin = state.dataset.is_some() && !state.busy();
            if ui
                .add_enabled(can_bin, egui::Button::new("Generate Matrix"))
                .clicked()
            {
                state.start_binning();
            }

            ui.separator();
            ui.strong("Export");

            let has_table = state.table.is_some() && !state.busy();
            if ui
                .add_enabled(has_table, egui::Button::new("Export as CSV"))
                .clicked()
            {
                export_dialog(state, "csv");
            }
            if ui
                .add_enabled(has_table, egui::Button::new("Export as Excel"))
                .clicked()
            {
                export_dialog(state, "xlsx");
            }

            ui.separator();
            ui.strong("Concatenate");

            if ui
                .add_enabled(!state.busy(), egui::Button::new("Import CSV/XLSX…"))
                .clicked()
            {
                import_concat_dialog(state);
            }

            // ---- Progress of the background worker ----
            ui.add_space(8.0);
            match state.activity {
                Activity::Idle => {}
                Activity::Loading { done, total } => {
                    let fraction = if total > 0 {
                        done as f32 / total as f32
                    } else {
                        0.0
                    };
                    ui.add(
                        egui::ProgressBar::new(fraction)
                            .text(format!("Loading {done}/{total}")),
                    );
                }
                Activity::Binning => {
                    ui.horizontal(|ui: &mut Ui| {
                        ui.spinner();
                        ui.label("Binning…");
                    });
                }
            }
        });
}

fn labeled_entry(ui: &mut Ui, label: &str, value: &mut String) {
    ui.label(label);
    ui.text_edit_singleline(value);
    ui.add_space(2.0);
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui
                .add_enabled(!state.busy(), egui::Button::new("Open imzML…"))
                .clicked()
            {
                open_imzml_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(dataset) = &state.dataset {
            ui.label(format!("{} spectra loaded", dataset.len()));
        }
        if let Some(table) = &state.table {
            ui.separator();
            ui.label(format!(
                "matrix: {} × {} bins",
                table.n_rows(),
                table.n_bins()
            ));
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            let color = if msg.starts_with("Error") {
                Color32::RED
            } else {
                ui.visuals().text_color()
            };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

fn open_imzml_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open imzML file")
        .add_filter("imzML files", &["imzML", "imzml"])
        .pick_file();

    if let Some(path) = file {
        state.start_load(path);
    }
}

fn export_dialog(state: &mut AppState, extension: &str) {
    let file = rfd::FileDialog::new()
        .set_title("Export table")
        .set_file_name(format!("binned_matrix.{extension}"))
        .add_filter(extension.to_ascii_uppercase(), &[extension])
        .save_file();

    if let Some(path) = file {
        state.export_table(&path);
    }
}

fn import_concat_dialog(state: &mut AppState) {
    let files = rfd::FileDialog::new()
        .set_title("Import tables to concatenate")
        .add_filter("Data files", &["csv", "xlsx"])
        .pick_files();

    if let Some(paths) = files {
        if !paths.is_empty() {
            state.import_and_concat(&paths);
        }
    }
}
