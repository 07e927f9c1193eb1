use eframe::egui::{Color32, Ui};
use egui_plot::{Legend, Line, Plot, PlotPoints};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Average-spectrum plot (central panel)
// ---------------------------------------------------------------------------

/// Render one mean curve per class of the current table.
pub fn average_spectrum_plot(ui: &mut Ui, state: &AppState) {
    if state.table.is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Load an imzML file and generate a matrix to see average spectra");
        });
        return;
    }

    Plot::new("average_spectrum_plot")
        .legend(Legend::default())
        .x_axis_label("m/z")
        .y_axis_label("Intensity")
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for average in &state.averages {
                let color = state
                    .palette
                    .as_ref()
                    .map(|palette| palette.color_for(&average.class))
                    .unwrap_or(Color32::LIGHT_BLUE);

                let points: PlotPoints = state
                    .plot_positions
                    .iter()
                    .zip(average.mean.iter())
                    .map(|(&x, &y)| [x, y])
                    .collect();

                let line = Line::new(points)
                    .name(format!("Class {} ({} rows)", average.class, average.n_rows))
                    .color(color)
                    .width(1.5);

                plot_ui.line(line);
            }
        });
}
