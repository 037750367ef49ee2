//! coursehub HTTP API server.
//!
//! This crate wires the platform-access and catalog libraries to their
//! production backends (Postgres, Redis, Stripe, Resend, NATS) and exposes
//! them as a JSON API under `/api/v1`, plus a realtime WebSocket at `/ws`.

pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod mail;
pub mod payment;
pub mod queue;
pub mod rate_limit;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod video;
