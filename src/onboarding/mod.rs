//! Registration: binding a chat to a pre-provisioned account, linking the
//! user's channel and confirming the bot may post there.

pub mod admin;
pub mod extract;
pub mod manager;
pub mod model;
pub mod prompts;
pub mod state;

pub use admin::{AdminCheck, AdminVerifier};
pub use manager::RegistrationManager;
pub use model::{ChatIdentity, User};
pub use state::RegistrationStage;
