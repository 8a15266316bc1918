/// Data layer: coordinate types, frame transforms, and input loading.
///
/// Architecture:
/// ```text
///  coordinates.csv           volume.json + mipN.raw
///        │                          │
///        ▼                          ▼
///   ┌──────────┐             ┌──────────────┐
///   │  loader   │ lines →    │    loader     │ manifest → MipStack
///   └──────────┘ InputRecord └──────────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ transform  │  nanometers → (SamplingCoordinate, ReportCoordinate)
///   └───────────┘
/// ```

pub mod loader;
pub mod model;
pub mod transform;
