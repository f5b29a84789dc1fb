//! Credential models, credential sources, and the token store that attaches them to requests.

pub mod provider;
pub mod store;
pub mod token;

pub use provider::*;
pub use store::*;
pub use token::*;
