//! Data layer: exposure headers, quickred frames, and the fiber diagnostic.
//!
//! Architecture:
//! ```text
//!  apR-*.apz / sdR-*.fit.gz          ap1D-a-*.fits.fz (.parquet/.json/.csv)
//!        │                                   │
//!        ▼                                   ▼
//!   ┌──────────┐                       ┌──────────┐
//!   │  header   │  → ExposureRecord     │  loader   │  → QuickredFrame
//!   └──────────┘                       └──────────┘
//!                                            │ window average
//!                                            ▼
//!                                      ┌──────────┐
//!                                      │ classify  │  ratio → missing/faint/bright
//!                                      └──────────┘
//!                                            │ fiber IDs per band
//!                                            ▼
//!                                      ┌──────────┐
//!                                      │ bundles   │  "50-52", "31 bundle", ...
//!                                      └──────────┘
//! ```

pub mod bundles;
pub mod classify;
pub mod discover;
pub mod error;
pub mod header;
pub mod loader;
pub mod model;
pub mod offset;
pub mod telemetry;
