//! # Content Harvester
//!
//! Turns semi-structured web and document content into normalized JSON
//! records.
//!
//! Content Harvester fetches listing pages and pulls ranked items out of
//! them with a two-phase section matcher, unpacks ZIP archives of
//! documents and extracts their text (digital PDF, OCR, plain text, JSON),
//! then writes one record per item plus a combined manifest. Translation
//! and bulk indexing are optional adapters at the edges.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐   ┌───────────┐
//! │  fetch /    │──▶│ html / extract│──▶│ normalize  │──▶│  writer   │
//! │  archive    │   │  (+ ocr)      │   │ (+ enrich) │   │ JSON files│
//! └─────────────┘   └──────────────┘   └────────────┘   └─────┬─────┘
//!                                                              ▼
//!                                                        ┌───────────┐
//!                                                        │   sink    │
//!                                                        │  (_bulk)  │
//!                                                        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest scrape                        # listing page → records + manifest
//! harvest archive docs.zip --ocr        # archive → records + manifest
//! harvest extract report.pdf            # one file to stdout
//! harvest index output/all_movies_combined.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`files`] | Folder listing and cleanup |
//! | [`fetch`] | HTTP page fetches and downloads |
//! | [`archive`] | ZIP validation and extraction |
//! | [`extract`] | Per-media-type text extraction |
//! | [`ocr`] | OCR for scanned PDFs |
//! | [`html`] | Listing item and section extraction |
//! | [`normalize`] | Record assembly |
//! | [`writer`] | Record files and the manifest |
//! | [`enrich`] | Optional translation |
//! | [`sink`] | Bulk indexing |
//! | [`pipeline`] | Run orchestration |
//! | [`progress`] | Progress reporting |

pub mod archive;
pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod files;
pub mod html;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod writer;
