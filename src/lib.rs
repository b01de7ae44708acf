//! # AI Workforce
//!
//! Client for an AI workforce: a secretary agent that takes requests in chat
//! and delegates them as tasks to specialized agents.
//!
//! This library provides:
//! - A REST client whose calls always resolve to a `{data, error, status}` envelope
//! - Services for agents, tasks and chat, plus per-user data in a document store
//! - A signed-in session that provisions the user's profile and starter agents
//! - A chat session that keeps the transcript and refreshes tasks on delegation
//!
//! ## Architecture
//!
//! ```text
//!   ChatSession ─┐          ┌─ AgentsService ─┐
//!   Dashboard  ──┼─ Services┼─ TasksService  ─┼─ ApiClient ── REST backend
//!   AuthContext ─┘          ├─ ChatService   ─┘
//!        │                  └─ FirestoreService ── DocumentStore ── Firestore / memory
//!        └─ IdentityProvider
//! ```
//!
//! ## Modules
//! - `api`: HTTP client and result envelope
//! - `services`: domain services over the client and the document store
//! - `store`: document store trait, Firestore REST and in-memory backends
//! - `auth`: identity provider and session state
//! - `conversation`: chat transcript and delegation flow
//! - `roster`: starter agents per user type

pub mod api;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod dashboard;
pub mod roster;
pub mod services;
pub mod settings;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiResponse};
pub use config::Config;
pub use services::Services;
