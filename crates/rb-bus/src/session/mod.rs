//! Session management

mod link;
mod table;

pub use link::SessionLink;
pub use table::{Session, SessionClosed, SessionState, SessionTable};
