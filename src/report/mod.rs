/// Output side: the flat table in CSV / JSON / Parquet (`writer`) and the
/// per-plate calibration report (`summary`).

pub mod summary;
pub mod writer;
