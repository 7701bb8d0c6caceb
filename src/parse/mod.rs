/// Text format parsers
///
/// This module turns uploaded text payloads into derived views:
/// - Survey CSV into a header/row table (csv.rs)
/// - KML placemarks into typed geometries with bounds (kml.rs)
///
/// Derived views are recomputed on demand and never persisted apart from
/// the survey table captured at upload time.

pub mod csv;
pub mod kml;
