//! Session domain model
//!
//! A session is the durable record of one grant flow for a
//! (provider, thread, profile) triple. See [`entities::SessionRecord`].

pub mod entities;
