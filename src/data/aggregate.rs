use std::collections::BTreeMap;

use super::model::LabeledTable;

// ---------------------------------------------------------------------------
// Per-class average spectra
// ---------------------------------------------------------------------------

/// One curve of the average-spectrum view: the elementwise mean of all
/// rows sharing a class label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassAverage {
    pub class: String,
    /// Mean intensity per bin – same length as the table's headers.
    pub mean: Vec<f64>,
    /// Number of rows that went into the mean.
    pub n_rows: usize,
}

/// Group the table's rows by class label and average every bin column
/// within each group. One curve per class, classes in sorted order.
pub fn average_spectra(table: &LabeledTable) -> Vec<ClassAverage> {
    let n_bins = table.n_bins();
    let mut groups: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();

    for row in &table.rows {
        let (sums, count) = groups
            .entry(row.class.as_str())
            .or_insert_with(|| (vec![0.0; n_bins], 0));
        for (sum, value) in sums.iter_mut().zip(row.values.iter()) {
            *sum += value;
        }
        *count += 1;
    }

    groups
        .into_iter()
        .map(|(class, (sums, count))| ClassAverage {
            class: class.to_string(),
            mean: sums.into_iter().map(|s| s / count as f64).collect(),
            n_rows: count,
        })
        .collect()
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
    fn test_two_classes_two_curves() {
        let t = table(&[
            ("A", &[1.0, 2.0]),
            ("A", &[3.0, 4.0]),
            ("B", &[10.0, 20.0]),
        ]);
        let curves = average_spectra(&t);

        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].class, "A");
        assert_eq!(curves[0].n_rows, 2);
        assert!((curves[0].mean[0] - 2.0).abs() < 1e-9);
        assert!((curves[0].mean[1] - 3.0).abs() < 1e-9);

        assert_eq!(curves[1].class, "B");
        assert_eq!(curves[1].n_rows, 1);
        assert!((curves[1].mean[0] - 10.0).abs() < 1e-9);
        assert!((curves[1].mean[1] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_class_single_curve() {
        let t = table(&[("Control", &[2.0, 6.0]), ("Control", &[4.0, 2.0])]);
        let curves = average_spectra(&t);
        assert_eq!(curves.len(), 1);
        assert!((curves[0].mean[0] - 3.0).abs() < 1e-9);
        assert!((curves[0].mean[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_table_no_curves() {
        let t = table(&[]);
        assert!(average_spectra(&t).is_empty());
    }
}
