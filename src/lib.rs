//! # Clipnote
//!
//! A web clipper that turns URLs into organized markdown notes.
//!
//! Clipnote classifies a URL to one of several content handlers (video,
//! recipe, restaurant, movie, book, or generic article), fetches and
//! normalizes the page, asks an LLM backend to write the note body, and
//! files the result into a per-type folder inside your notes directory.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌─────────┐
//! │Classifier│──▶│  Handler    │──▶│ Generation │──▶│ NoteSink │
//! │ URL+LLM  │   │ fetch/render│   │  backend   │   │ markdown │
//! └──────────┘   └────────────┘   └───────────┘   └─────────┘
//!        └──────────── NotePipeline (5 stages) ───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! clip clip https://www.seriouseats.com/miso-soup   # save a note
//! clip handlers                                     # list content types
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`traits`] | Content-handler trait and registry |
//! | [`classify`] | Two-phase URL/content classification |
//! | [`fetch`] | HTTP page fetching |
//! | [`extract`] | HTML metadata extraction helpers |
//! | [`llm`] | Generation backend abstraction (OpenAI, Ollama) |
//! | [`pipeline`] | Five-stage clip orchestrator |
//! | [`progress`] | Progress events and CLI reporters |
//! | [`store`] | Note persistence and filename sanitization |
//! | [`error`] | Error types with display-ready messages |

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod handler_article;
pub mod handler_book;
pub mod handler_movie;
pub mod handler_recipe;
pub mod handler_restaurant;
pub mod handler_video;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod traits;
