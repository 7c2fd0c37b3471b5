//! Teloxide glue: turns updates into moderator events.

mod callback;
mod chat_member;
mod handle_message;

pub use callback::*;
pub use chat_member::*;
pub use handle_message::*;

use teloxide::types::User;

use crate::moderator::UserProfile;

pub fn profile(user: &User) -> UserProfile {
    UserProfile {
        id: user.id.0,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
    }
}
