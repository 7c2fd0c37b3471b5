use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;

use crate::moderator::{ButtonPress, Moderator};

pub async fn handle_callback(moderator: Arc<Moderator>, query: CallbackQuery) -> ResponseResult<()> {
    let Some(data) = query.data.clone() else {
        return Ok(());
    };
    let Some(message) = query.message.as_ref() else {
        log::warn!("Callback query {} without message", query.id);
        return Ok(());
    };
    let press = ButtonPress {
        query_id: query.id.clone(),
        clicker: query.from.id.0,
        chat_id: message.chat().id.0,
        message_id: Some(message.id()),
        data,
    };
    let outcome = moderator.on_button_press(&press, Utc::now()).await;
    log::info!("Button pressed by {}: {:?}", query.from.id, outcome);
    Ok(())
}
