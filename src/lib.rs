//! # College Assistant
//!
//! A chat assistant that answers students' questions about the lecture
//! timetable.
//!
//! A question is matched against the cached timetable with Arabic keyword
//! rules (day, level, department, "today"), the relevant lectures are
//! summarized into a prompt, and a generative model writes the answer.
//! When the model is unavailable the assistant still answers with a plain
//! listing of the matched lectures whenever it can.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐   ┌────────────┐
//! │ question │──▶│ response     │──▶│ keyword  │──▶│ generator  │
//! │ CLI/HTTP │   │ cache (TTL)  │   │ filter   │   │ (Gemini)   │
//! └──────────┘   └──────────────┘   └────┬─────┘   └─────┬──────┘
//!                                        │               │ failure
//!                                   ┌────▼─────┐   ┌─────▼──────┐
//!                                   │ lecture  │   │ fallback   │
//!                                   │ cache    │   │ listing    │
//!                                   └────┬─────┘   └────────────┘
//!                                        ▼
//!                                     SQLite
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! assist init                          # create database
//! assist lectures import timetable.json
//! assist ask "ما هي محاضرات اليوم؟"
//! assist serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`keywords`] | Day / level / department keyword tables |
//! | [`filter`] | Keyword lecture filter and scoring |
//! | [`chat`] | Question answering with layered fallback |
//! | [`generation`] | Generative model client and error classification |
//! | [`prompt`] | Prompt and fallback listing rendering |
//! | [`cache`] | Response cache with TTL and JSON snapshot |
//! | [`lectures`] | Lecture store and lecture cache |
//! | [`transcript`] | Persisted chat transcript |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`documents`] | Knowledge documents and similarity search |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod chat;
pub mod clock;
pub mod commands;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod filter;
pub mod generation;
pub mod keywords;
pub mod lectures;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod server;
pub mod transcript;
