/// Data layer: core types and the pure transforms between them.
///
/// Architecture:
/// ```text
///  .imzML / .ibd
///        │
///        ▼
///   ┌──────────┐
///   │  imzml    │  parse manifest, read arrays → MsiDataset
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   bin     │  fixed-width m/z histogram → LabeledTable
///   └──────────┘
///        │
///        ├─────────────────┐
///        ▼                 ▼
///   ┌──────────┐      ┌──────────┐
///   │ aggregate │      │  table    │  CSV/XLSX export, import, concat
///   └──────────┘      └──────────┘
///    mean curve
///    per class
/// ```
///
/// Everything here is synchronous and holds no session state; the
/// shell owns the current dataset/table and threads it through.

pub mod aggregate;
pub mod bin;
pub mod imzml;
pub mod model;
pub mod table;
