//! Notes Service
//!
//! Small HTTP service for short text notes stored in PostgreSQL and single-file
//! uploads written either to a local directory or to an S3 bucket.
//!
//! ## Features
//!
//! - **Config Probe**: `GET /` reports the effective storage mode and, unless
//!   disabled, the database host/name/user and whether TLS is in use
//! - **Notes**: `GET /notes` lists newest first, `POST /notes` appends
//! - **Uploads**: `POST /upload` stores the `file` part through the backend
//!   chosen at startup
//!
//! ## Architecture
//!
//! ```text
//!  Environment              HTTP API                   Backends
//! ┌──────────────┐        ┌──────────────┐          ┌──────────────┐
//! │ Settings     │───────▶│ GET /        │          │ PostgreSQL   │
//! └──────────────┘        │ GET  /notes  │─────────▶│ notes        │
//!        │                │ POST /notes  │          └──────────────┘
//!        ▼                │ POST /upload │
//! ┌──────────────┐        └──────────────┘          ┌──────────────┐
//! │ Backend      │               │           ┌─────▶│ uploads/     │
//! │ Selection    │───────────────┴───────────┤      └──────────────┘
//! └──────────────┘                           │      ┌──────────────┐
//!                                            └─────▶│ S3 Bucket    │
//!                                                   └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod local_storage;
pub mod note_store;
pub mod s3_uploader;
pub mod storage;

pub use api::{create_router, start_api_server, AppState};
pub use config::{PasswordSource, Settings, StorageKind};
pub use error::{ApiError, StoreError, UploadError};
pub use local_storage::LocalBackend;
pub use note_store::{Note, NoteStore, PgNoteStore};
pub use s3_uploader::S3Backend;
pub use storage::{select_backend, UploadBackend, UploadDescriptor, UploadedFile};
