//! Post creation: the interview, generation round trip, review, call-to-action
//! button setup and publication.

pub mod callback;
pub mod flow;
pub mod model;
pub mod prompts;
pub mod sanitize;
pub mod state;
pub mod supervisor;
pub mod validate;

pub use callback::{CallbackPayload, GeneratedPost, PayloadError};
pub use flow::{FlowDeps, PostFlow};
pub use model::{ButtonType, Material, PostSession};
pub use state::SessionStatus;
pub use supervisor::{TimeoutSupervisor, spawn_sweep};
