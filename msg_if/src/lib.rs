//! # Message interface library
//!
//! This crate owns the typed message set exchanged between tasks of the
//! Triton vehicle software, and the in-process bus which transports them.
//!
//! Messages are immutable once dispatched. A [`msg::Message`] couples a
//! [`msg::Header`] (source identifiers and wall clock timestamp) with a
//! [`msg::Payload`], one variant per message kind. Tasks subscribe to kinds
//! on the [`bus::Bus`] and receive shared handles to dispatched messages
//! through their [`bus::Mailbox`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod bus;
pub mod msg;
