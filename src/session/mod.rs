//! Recording-session engine: the session aggregate, take stamping, sync-offset
//! resolution and persistence.

pub mod error;
pub mod lifecycle;
pub mod state;
pub mod storage;
pub mod sync;

pub use error::{SessionError, SessionResult};
pub use lifecycle::end_session;
pub use state::{lock_session, Session, SharedSession, TakeState};
pub use storage::{SaveReport, SessionStore, StreamingWriter};
