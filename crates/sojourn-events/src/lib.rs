//! Sojourn Events
//!
//! Both history entries and the navigation engine expose lifecycle
//! notifications. Rather than an inheritance chain, each of them owns an
//! [`EventTarget`]: a per-kind ordered listener list plus one replaceable
//! "on-event" handler slot per kind.

mod target;

pub use target::{Event, EventTarget, Listener, ListenerId};
