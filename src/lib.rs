// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cortex — a message-driven runtime for coordinating a fleet of
//! heterogeneous agents (human or AI) that collaborate through a shared
//! broker.
//!
//! Every unit of work flows as a typed envelope on named queues; agents
//! consume their own inbox queue, process a message, optionally reply,
//! delegate, or decompose it into a multi-task workflow. The runtime
//! enforces identity, authority, correlation, retry supervision, and
//! request/reply semantics.
//!
//! This facade re-exports the member crates:
//!
//! - [`core`](cortex_core) — envelopes, reference codes, claims, payloads
//! - [`bus`](cortex_bus) — the bus trait, in-memory bus, broker contract
//! - [`registry`](cortex_registry) — agent and skill registries
//! - [`tracker`](cortex_tracker) — workflow, delegation, and plan state
//! - [`authority`](cortex_authority) — the authority provider
//! - [`runtime`](cortex_runtime) — harness, runtime, supervision
//! - [`agent`](cortex_agent) — the skill-driven agent
//! - [`config`](cortex_config) — TOML settings
//! - [`telemetry`](cortex_telemetry) — tracing bootstrap and counters

#![deny(unsafe_code)]

pub use cortex_agent as agent;
pub use cortex_authority as authority;
pub use cortex_bus as bus;
pub use cortex_config as config;
pub use cortex_core as core;
pub use cortex_registry as registry;
pub use cortex_runtime as runtime;
pub use cortex_telemetry as telemetry;
pub use cortex_tracker as tracker;
