//! Discovery and batch download of DQM ROOT files from the certificate
//! protected DQM GUI archive.

pub mod app;
pub mod config;
pub mod domain;
pub mod era;
pub mod error;
pub mod listing;
pub mod oms;
pub mod output;
pub mod progress;
pub mod resolver;
pub mod store;
pub mod transport;
