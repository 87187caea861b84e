/// Transformation stages applied after loading, in run order:
/// `join` (plate ↔ identifier table by date), `reshape` (grid → 96
/// readings), `calibrate` (standards → linear model), `predict`, `flatten`
/// (per-plate records → one long table).

pub mod calibrate;
pub mod flatten;
pub mod join;
pub mod predict;
pub mod reshape;
