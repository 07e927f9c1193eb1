use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use calamine::{Data, Reader};

use super::model::{concat_tables, LabeledRow, LabeledTable};

/// Header cell that starts every exported table.
const CLASS_COLUMN: &str = "Class";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Write a labeled table to a file. Dispatch by extension
/// (`.csv` or `.xlsx`).
pub fn write_table(path: &Path, table: &LabeledTable) -> Result<()> {
    match extension_of(path).as_str() {
        "csv" => write_csv(path, table),
        "xlsx" => write_xlsx(path, table),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Read a previously exported table back in. Dispatch by extension.
pub fn read_table(path: &Path) -> Result<LabeledTable> {
    match extension_of(path).as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" => read_xlsx(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Read every input and stack them row-wise. Any schema mismatch or
/// unreadable file rejects the whole operation; nothing is partially
/// merged.
pub fn read_and_concat(paths: &[std::path::PathBuf]) -> Result<LabeledTable> {
    let mut tables = Vec::with_capacity(paths.len());
    for path in paths {
        let table = read_table(path)
            .with_context(|| format!("reading {}", path.display()))?;
        tables.push(table);
    }
    concat_tables(tables).context("concatenating imported tables")
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn write_csv(path: &Path, table: &LabeledTable) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv_to(file, table)
}

fn write_csv_to<W: Write>(writer: W, table: &LabeledTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.n_bins() + 1);
    header.push(CLASS_COLUMN.to_string());
    header.extend(table.bin_labels.iter().cloned());
    wtr.write_record(&header).context("writing CSV header")?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(table.n_bins() + 1);
        record.push(row.class.clone());
        record.extend(row.values.iter().map(|v| v.to_string()));
        wtr.write_record(&record).context("writing CSV row")?;
    }

    wtr.flush().context("flushing CSV")?;
    Ok(())
}

fn read_csv(path: &Path) -> Result<LabeledTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    read_csv_from(file)
}

fn read_csv_from<R: Read>(reader: R) -> Result<LabeledTable> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr.headers().context("reading CSV header")?;
    let bin_labels = parse_header(headers.iter())?;

    let mut rows = Vec::new();
    for (row_no, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let class = record.get(0).unwrap_or("").to_string();
        let values = record
            .iter()
            .skip(1)
            .enumerate()
            .map(|(col, cell)| {
                cell.trim().parse::<f64>().with_context(|| {
                    format!("row {row_no}, column \"{}\": \"{cell}\" is not a number",
                        bin_labels[col])
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(LabeledRow { class, values });
    }

    Ok(LabeledTable { bin_labels, rows })
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

fn write_xlsx(path: &Path, table: &LabeledTable) -> Result<()> {
    let mut workbook = build_workbook(table)?;
    workbook
        .save(path)
        .with_context(|| format!("saving {}", path.display()))?;
    Ok(())
}

fn build_workbook(table: &LabeledTable) -> Result<rust_xlsxwriter::Workbook> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();

    worksheet
        .write_string(0, 0, CLASS_COLUMN)
        .context("writing header")?;
    for (col, label) in table.bin_labels.iter().enumerate() {
        worksheet
            .write_string(0, col as u16 + 1, label)
            .context("writing header")?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        let r = row_idx as u32 + 1;
        worksheet
            .write_string(r, 0, &row.class)
            .context("writing class cell")?;
        for (col, value) in row.values.iter().enumerate() {
            worksheet
                .write_number(r, col as u16 + 1, *value)
                .context("writing value cell")?;
        }
    }

    Ok(workbook)
}

fn read_xlsx(path: &Path) -> Result<LabeledTable> {
    let mut workbook = calamine::open_workbook_auto(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no sheets")?
        .context("reading first sheet")?;
    table_from_range(&range)
}

fn table_from_range(range: &calamine::Range<Data>) -> Result<LabeledTable> {
    let mut row_iter = range.rows();
    let header = row_iter.next().context("sheet is empty")?;
    let bin_labels = parse_header(header.iter().map(cell_text))?;

    let mut rows = Vec::new();
    for (row_no, cells) in row_iter.enumerate() {
        if cells.len() != bin_labels.len() + 1 {
            bail!(
                "row {row_no} has {} cells, expected {}",
                cells.len(),
                bin_labels.len() + 1
            );
        }
        let class = cells.first().map(cell_text).unwrap_or_default();
        let values = cells
            .iter()
            .skip(1)
            .enumerate()
            .map(|(col, cell)| {
                cell_number(cell).with_context(|| {
                    format!(
                        "row {row_no}, column \"{}\": {cell:?} is not a number",
                        bin_labels[col]
                    )
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(LabeledRow { class, values });
    }

    Ok(LabeledTable { bin_labels, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell_number(cell: &Data) -> Result<f64> {
    match cell {
        Data::Float(f) => Ok(*f),
        Data::Int(i) => Ok(*i as f64),
        Data::String(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("\"{s}\" is not a number")),
        other => bail!("unexpected cell {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Shared header handling
// ---------------------------------------------------------------------------

fn parse_header<I, S>(cells: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = cells.into_iter();
    let first = iter.next().context("file has no header row")?;
    if first.as_ref() != CLASS_COLUMN {
        bail!(
            "not a labeled table: first header cell is \"{}\", expected \"{CLASS_COLUMN}\"",
            first.as_ref()
        );
    }
    Ok(iter.map(|c| c.as_ref().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> LabeledTable {
        LabeledTable {
            bin_labels: vec!["600.25".to_string(), "600.75".to_string()],
            rows: vec![
                LabeledRow {
                    class: "A".to_string(),
                    values: vec![10.0, 0.0],
                },
                LabeledRow {
                    class: "B".to_string(),
                    values: vec![0.5, 2.25],
                },
            ],
        }
    }

    #[test]
    fn test_csv_round_trip() {
        let table = sample_table();
        let mut buf = Vec::new();
        write_csv_to(&mut buf, &table).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("Class,600.25,600.75"));

        let back = read_csv_from(&buf[..]).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_csv_round_trip_empty_table() {
        let table = LabeledTable {
            bin_labels: vec!["600.25".to_string()],
            rows: Vec::new(),
        };
        let mut buf = Vec::new();
        write_csv_to(&mut buf, &table).unwrap();
        let back = read_csv_from(&buf[..]).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_csv_rejects_non_numeric_cell() {
        let data = b"Class,600.25\nA,oops\n";
        let err = read_csv_from(&data[..]).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn test_csv_rejects_foreign_header() {
        let data = b"Sample,600.25\nA,1.0\n";
        let err = read_csv_from(&data[..]).unwrap_err();
        assert!(err.to_string().contains("not a labeled table"));
    }

    #[test]
    fn test_xlsx_round_trip() {
        let table = sample_table();
        let buf = build_workbook(&table)
            .unwrap()
            .save_to_buffer()
            .unwrap();

        let mut workbook = calamine::Xlsx::new(std::io::Cursor::new(buf)).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        let back = table_from_range(&range).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_xlsx_numeric_class_cells_stay_text() {
        // A class cell read back as a number is kept as its text form.
        let cells = vec![
            vec![
                Data::String("Class".to_string()),
                Data::String("600.25".to_string()),
            ],
            vec![Data::Int(3), Data::Float(1.5)],
        ];
        let range = calamine::Range::from_sparse(
            cells
                .into_iter()
                .enumerate()
                .flat_map(|(r, row)| {
                    row.into_iter()
                        .enumerate()
                        .map(move |(c, cell)| ((r as u32, c as u32), cell))
                })
                .map(|((r, c), cell)| calamine::Cell::new((r, c), cell))
                .collect(),
        );
        let back = table_from_range(&range).unwrap();
        assert_eq!(back.rows[0].class, "3");
        assert!((back.rows[0].values[0] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_dispatch_rejects_unknown_extension() {
        let err = read_table(Path::new("table.parquet")).unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension"));
    }
}
