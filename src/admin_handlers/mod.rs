mod admin;
pub mod commands;
pub mod dispatcher;

pub use admin::*;
pub use dispatcher::*;
pub use self::commands::AdminCommand;
