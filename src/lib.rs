//! # askdocs
//!
//! Question answering over your own documents.
//!
//! askdocs pulls documents from configured sources (local folders, GitHub
//! repositories, Google Drive folders, plain URLs), extracts their text,
//! splits it into overlapping chunks, embeds the chunks into a vector index,
//! and answers questions from the most relevant chunks with a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Sources   │──▶│   Pipeline   │──▶│ Vector index │
//! │ FS/GH/Drive │   │ Extract+Chunk│   │ memory/sqlite│
//! │    URL      │   │    +Embed    │   └──────┬───────┘
//! └─────────────┘   └──────────────┘          │
//!                                  ┌──────────┤
//!                                  ▼          ▼
//!                            ┌──────────┐ ┌──────────┐
//!                            │   CLI    │ │   HTTP   │
//!                            │(askdocs) │ │  (axum)  │
//!                            └──────────┘ └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Application root shared by CLI and server |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`traits`] | `DocumentSource` trait and registry |
//! | [`connector_fs`] | Local folder source |
//! | [`connector_github`] | GitHub repository source |
//! | [`connector_drive`] | Google Drive folder source |
//! | [`connector_url`] | URL list source |
//! | [`extract`] | PDF, DOCX and plain-text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Answer generation providers |
//! | [`store`] | Vector index backends |
//! | [`ingest`] | Sync pipeline |
//! | [`retrieve`] | Similarity retrieval |
//! | [`answer`] | Prompt assembly and answering |
//! | [`server`] | HTTP API |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod app;
pub mod chunk;
pub mod config;
pub mod connector_drive;
pub mod connector_fs;
pub mod connector_github;
pub mod connector_url;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
mod http;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod sources;
pub mod status;
pub mod store;
pub mod traits;
