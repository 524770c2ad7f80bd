//! Jandi API client and authentication module.
//!
//! This module provides:
//! - Credential resolution, including browser sign-in
//! - Access token and identity management
//! - API client for the read endpoints
//! - Tolerant response models and text rendering

pub mod auth;
pub mod client;
pub mod format;
pub mod lookup;
pub mod models;
pub mod session;

pub use auth::{BrowserSignIn, Credential, CredentialResolver, SignIn};
pub use client::{ApiRequest, ImageData, JandiClient};
pub use lookup::{DmMatch, find_dm_by_name};
pub use models::{
    Attachment, Comment, DirectChat, EntityId, GroupChat, Member, MessageRecord, Payload,
    RoomDirectory, Topic,
};
pub use session::{AccessToken, Identity};
