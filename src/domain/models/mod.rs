mod generation;
mod message;
mod turn;
mod user_profile;

pub use generation::*;
pub use message::*;
pub use turn::*;
pub use user_profile::*;
