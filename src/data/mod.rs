pub mod model;

pub use model::{Location, MeasurementDefinition, Reading, Station, WindowRow};
