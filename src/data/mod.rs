/// Data layer: core types, filename parsing, loading, and plate selection.
///
/// Architecture:
/// ```text
///  raw/*.csv          ids/*.csv
///      │                  │
///      ▼                  ▼
///   ┌──────────┐    ┌──────────┐
///   │ filename │    │ filename │  regex → date (+ plate id)
///   └──────────┘    └──────────┘
///      │                  │
///      ▼                  ▼
///   ┌──────────┐    ┌──────────────┐
///   │  loader  │    │    loader    │
///   │ RawPlate │    │IdentifierTable│
///   └──────────┘    └──────────────┘
///      │                  │
///      └───────┬──────────┘
///              ▼
///        ┌──────────┐
///        │  filter  │  plate id selection, join on position → SampleRow
///        └──────────┘
/// ```

pub mod filename;
pub mod filter;
pub mod loader;
pub mod model;
