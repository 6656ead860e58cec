//! Task dispatch and admission core for queued generative-AI jobs.
//!
//! See `SPEC_FULL.md` at the repository root for the full component
//! breakdown. Modules below follow the dependency order from that
//! document: keyed store -> ledger -> admission -> task queue -> worker
//! -> payment pipeline, with `server` wiring the HTTP ingress on top.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;
