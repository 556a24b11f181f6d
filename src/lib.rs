//! tsplay: a TypeScript playground core.
//!
//! Source goes through the [`recognizer`] first; unrecognized source is
//! rewritten by [`transform`] and executed by the [`driver`] inside a fresh
//! QuickJS context with [`capture`] and [`network`] capabilities installed.
//! [`playground::Playground`] ties these together.

pub mod assistant;
pub mod cache;
pub mod capture;
pub mod config;
pub mod driver;
pub mod network;
pub mod playground;
pub mod printer;
pub mod recognizer;
pub mod transform;
