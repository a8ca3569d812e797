//! Janus - Cross-Origin Trust-Boundary Analyzer
//!
//! Detects servers that grant overly permissive cross-origin access, either
//! by reflecting or wildcarding an untrusted `Origin` in their CORS
//! responses, or by publishing a crossdomain.xml / clientaccesspolicy.xml
//! policy that admits any domain. Policy documents are parsed without any
//! entity or DTD resolution.

pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod report;
pub mod scanner;
pub mod telemetry;
pub mod xml;
