//! Backend worker + protocol types used by the reader session and tests.

mod protocol;
mod worker;

pub use protocol::{LoadedNotations, StoreCmd, StoreEvent, Ticket};
pub use worker::{execute, spawn_backend, BackendHandle};
