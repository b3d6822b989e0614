//! # Core Client
//!
//! Client-side core for a document search application backed by three HTTP
//! services: a central backend, a search API and an update API.
//!
//! The core brings the backends up in order before anything else runs,
//! drives paginated search with stale-response suppression, derives list and
//! map projections from result records, and tracks the long-running update
//! job.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │  Probe   │──▶│ RetryLoop │──▶│  Readiness   │──▶ gate
//! │ HTTP/JSON│   │ deadline  │   │ Orchestrator │
//! └──────────┘   └───────────┘   └──────────────┘
//!                                        │ Ready
//!                      ┌─────────────────┼──────────────┐
//!                      ▼                 ▼              ▼
//!                ┌──────────┐     ┌───────────┐   ┌──────────┐
//!                │  Search  │────▶│ Projector │   │ Updates  │
//!                │Controller│     │ list/map  │   │ Monitor  │
//!                └──────────┘     └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! corectl wait                          # bring the backends up
//! corectl search "fuel convoy" --view map
//! corectl report <sha256>
//! corectl updates                       # run the update job
//! corectl browse                        # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Client error taxonomy |
//! | [`models`] | Records, queries, pages, view modes |
//! | [`backend`] | JSON-over-HTTP client per service |
//! | [`probe`] | Single-request readiness probes |
//! | [`retry`] | Bounded retry-with-delay primitive |
//! | [`readiness`] | Ordered bring-up and lazy per-service gate |
//! | [`search`] | Query lifecycle, pagination, supersession |
//! | [`project`] | Snippets, display names, map markers |
//! | [`report`] | Full report retrieval and detail view |
//! | [`updates`] | Update job start and progress polling |
//! | [`browse`] | Interactive terminal session |

pub mod backend;
pub mod browse;
pub mod config;
pub mod error;
pub mod models;
pub mod probe;
pub mod project;
pub mod readiness;
pub mod report;
pub mod retry;
pub mod search;
pub mod updates;
