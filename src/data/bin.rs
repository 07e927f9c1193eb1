use rayon::prelude::*;
use thiserror::Error;

use super::model::{BinGrid, GridError, LabeledRow, LabeledTable, Spectrum};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("invalid parameters: {field} \"{value}\" is not a number")]
    NotANumber { field: &'static str, value: String },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Everything the binning transform needs besides the spectra.
#[derive(Debug, Clone, PartialEq)]
pub struct BinParams {
    pub class_label: String,
    pub mz_min: f64,
    pub mz_max: f64,
    pub bin_size: f64,
    pub normalize: bool,
    pub log_transform: bool,
}

impl BinParams {
    /// Parse the raw text entries of the parameter form. Reports the
    /// first non-numeric field; grid-shape violations are caught when
    /// the grid is built.
    pub fn from_entries(
        class_label: &str,
        mz_min: &str,
        mz_max: &str,
        bin_size: &str,
        normalize: bool,
        log_transform: bool,
    ) -> Result<Self, ParamError> {
        fn parse(field: &'static str, value: &str) -> Result<f64, ParamError> {
            value.trim().parse::<f64>().map_err(|_| ParamError::NotANumber {
                field,
                value: value.to_string(),
            })
        }

        Ok(BinParams {
            class_label: class_label.trim().to_string(),
            mz_min: parse("min m/z", mz_min)?,
            mz_max: parse("max m/z", mz_max)?,
            bin_size: parse("bin size", bin_size)?,
            normalize,
            log_transform,
        })
    }

    pub fn grid(&self) -> Result<BinGrid, GridError> {
        BinGrid::new(self.mz_min, self.mz_max, self.bin_size)
    }
}

// ---------------------------------------------------------------------------
// Binning transform
// ---------------------------------------------------------------------------

/// Bin spectra into a fixed-width intensity matrix with a class column.
///
/// Each peak inside `[mz_min, mz_max)` adds its intensity to its bin;
/// everything else is dropped. Rows are independent, so they are filled
/// in parallel. With `normalize`, each row is divided by its own total
/// (zero-total rows stay as they are); with `log_transform`, `ln(1+x)`
/// is applied afterwards.
pub fn bin_spectra(spectra: &[Spectrum], params: &BinParams) -> Result<LabeledTable, ParamError> {
    let grid = params.grid()?;
    let bin_labels = grid.labels();

    let rows: Vec<LabeledRow> = spectra
        .par_iter()
        .map(|spectrum| {
            let mut values = bin_row(spectrum, &grid);

            if params.normalize {
                let total: f64 = values.iter().sum();
                if total != 0.0 {
                    for v in values.iter_mut() {
                        *v /= total;
                    }
                }
            }
            if params.log_transform {
                for v in values.iter_mut() {
                    *v = v.ln_1p();
                }
            }

            LabeledRow {
                class: params.class_label.clone(),
                values,
            }
        })
        .collect();

    Ok(LabeledTable { bin_labels, rows })
}

/// Group-sum one spectrum's peaks over the bin index.
fn bin_row(spectrum: &Spectrum, grid: &BinGrid) -> Vec<f64> {
    let mut values = vec![0.0; grid.n_bins()];
    for (&mz, &intensity) in spectrum.mz.iter().zip(spectrum.intensity.iter()) {
        if let Some(bin) = grid.bin_index(mz) {
            values[bin] += intensity;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(mz: &[f64], intensity: &[f64]) -> Spectrum {
        Spectrum {
            mz: mz.to_vec(),
            intensity: intensity.to_vec(),
            position: (1, 1, 1),
        }
    }

    fn params(mz_min: f64, mz_max: f64, bin_size: f64) -> BinParams {
        BinParams {
            class_label: "Tumor".to_string(),
            mz_min,
            mz_max,
            bin_size,
            normalize: false,
            log_transform: false,
        }
    }

    #[test]
    fn test_single_peak_lands_in_first_bin() {
        // 600–601 at 0.5 gives bins centered 600.25 and 600.75.
        let table = bin_spectra(
            &[spectrum(&[600.2], &[10.0])],
            &params(600.0, 601.0, 0.5),
        )
        .unwrap();

        assert_eq!(table.bin_labels, vec!["600.25", "600.75"]);
        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.rows[0].class, "Tumor");
        assert!((table.rows[0].values[0] - 10.0).abs() < 1e-9);
        assert!(table.rows[0].values[1].abs() < 1e-9);
    }

    #[test]
    fn test_intensities_within_a_bin_are_summed() {
        let table = bin_spectra(
            &[spectrum(&[600.1, 600.2, 600.6], &[1.0, 2.0, 4.0])],
            &params(600.0, 601.0, 0.5),
        )
        .unwrap();

        assert!((table.rows[0].values[0] - 3.0).abs() < 1e-9);
        assert!((table.rows[0].values[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_conservation_of_in_range_intensity() {
        // Total over bins equals the in-range input total, for a bin
        // size that does not divide the range.
        let sp = spectrum(
            &[599.9, 600.05, 600.31, 600.77, 600.99, 601.0, 612.3],
            &[100.0, 1.5, 2.5, 3.5, 4.5, 50.0, 60.0],
        );
        let table = bin_spectra(&[sp], &params(600.0, 601.0, 0.3)).unwrap();

        let binned_total: f64 = table.rows[0].values.iter().sum();
        // In range: 1.5 + 2.5 + 3.5 + 4.5; 599.9 below, 601.0 and
        // 612.3 at/above the half-open maximum.
        assert!((binned_total - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_rows_sum_to_one() {
        let mut p = params(600.0, 601.0, 0.5);
        p.normalize = true;
        let table = bin_spectra(
            &[
                spectrum(&[600.1, 600.7], &[3.0, 1.0]),
                spectrum(&[650.0], &[5.0]), // out of range → zero row
            ],
            &p,
        )
        .unwrap();

        let total: f64 = table.rows[0].values.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((table.rows[0].values[0] - 0.75).abs() < 1e-9);

        // Zero-total rows are left unscaled, not divided.
        assert!(table.rows[1].values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_log_transform_keeps_zero_rows_zero() {
        let mut p = params(600.0, 601.0, 0.5);
        p.log_transform = true;
        let table = bin_spectra(&[spectrum(&[], &[])], &p).unwrap();
        assert!(table.rows[0].values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_normalize_runs_before_log() {
        let mut p = params(600.0, 601.0, 0.5);
        p.normalize = true;
        p.log_transform = true;
        let table = bin_spectra(&[spectrum(&[600.1, 600.7], &[1.0, 3.0])], &p).unwrap();

        assert!((table.rows[0].values[0] - 0.25f64.ln_1p()).abs() < 1e-12);
        assert!((table.rows[0].values[1] - 0.75f64.ln_1p()).abs() < 1e-12);
    }

    #[test]
    fn test_unsorted_mz_is_tolerated() {
        let table = bin_spectra(
            &[spectrum(&[600.7, 600.1, 600.6], &[1.0, 2.0, 4.0])],
            &params(600.0, 601.0, 0.5),
        )
        .unwrap();
        assert!((table.rows[0].values[0] - 2.0).abs() < 1e-9);
        assert!((table.rows[0].values[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_spectrum_list_gives_empty_shaped_table() {
        let table = bin_spectra(&[], &params(600.0, 601.0, 0.5)).unwrap();
        assert_eq!(table.n_rows(), 0);
        assert_eq!(table.bin_labels, vec!["600.25", "600.75"]);
    }

    #[test]
    fn test_entry_parsing_rejects_garbage() {
        let err = BinParams::from_entries("A", "abc", "1000", "0.1", false, false).unwrap_err();
        assert!(matches!(err, ParamError::NotANumber { field: "min m/z", .. }));

        let err = BinParams::from_entries("A", "600", "1000", "", false, false).unwrap_err();
        assert!(matches!(err, ParamError::NotANumber { field: "bin size", .. }));
    }

    #[test]
    fn test_entry_parsing_accepts_padded_numbers() {
        let p = BinParams::from_entries(" Tumor ", " 600 ", "1000.5", "0.1", true, false).unwrap();
        assert_eq!(p.class_label, "Tumor");
        assert!((p.mz_min - 600.0).abs() < 1e-9);
        assert!((p.mz_max - 1000.5).abs() < 1e-9);
        assert!(p.normalize);
    }

    #[test]
    fn test_grid_errors_pass_through() {
        let err = bin_spectra(&[], &params(600.0, 601.0, -1.0)).unwrap_err();
        assert_eq!(err, ParamError::Grid(GridError::NonPositiveBinSize(-1.0)));
    }
}
