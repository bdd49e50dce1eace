//! opsboard - an operator dashboard server
//!
//! This library provides an HTTP dashboard that:
//! - Runs preconfigured commands under a global concurrency ceiling
//!   with separate queue-wait and execution deadlines
//! - Serves the same routing tree over HTTP, HTTPS, and HTTP/3 (QUIC),
//!   advertising the QUIC endpoint via Alt-Svc on the TLS companion
//! - Fetches preconfigured proxy targets and reports the results
//! - Serves prerendered HTML pages, static files, and debug endpoints

pub mod altsvc;
pub mod command;
pub mod config;
pub mod debug;
pub mod environment;
pub mod gate;
pub mod handlers;
pub mod http3;
pub mod pages;
pub mod proxy;
pub mod router;
pub mod server;
pub mod staticfiles;
pub mod tls;
