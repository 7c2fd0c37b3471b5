use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use teloxide::prelude::*;

use gatekeeper_telegram_bot::admin_handlers::run_dispatcher;
use gatekeeper_telegram_bot::cache::Store;
use gatekeeper_telegram_bot::maintenance::Maintenance;
use gatekeeper_telegram_bot::moderator::Moderator;
use gatekeeper_telegram_bot::reputation::ReputationGate;
use gatekeeper_telegram_bot::settings::{ConfigPaths, Rules};
use gatekeeper_telegram_bot::transport::{ChatTransport, DryRunTransport, TelegramTransport};

/// Crate debug records pass the logger filter; the global max level, which
/// `/debug_mode` flips, decides whether they are emitted.
fn init_logging() {
    let rust_log = std::env::var("RUST_LOG").ok();
    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .filter_level(log::LevelFilter::Info)
        .filter_module("gatekeeper_telegram_bot", log::LevelFilter::Debug);
    if let Some(filters) = &rust_log {
        builder.parse_filters(filters);
    }
    builder.init();

    let debug = std::env::var("BOT_DEBUG").is_ok_and(|v| v.eq_ignore_ascii_case("true"));
    if debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else if rust_log.is_none() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();
    log::info!("Starting the gatekeeper bot...");

    let paths = ConfigPaths::from_env();
    let rules = Rules::load(&paths).context("load configuration")?;
    let settings = rules.settings.clone();

    let store = Store::load(&settings.snapshot_path, settings.primary_chat_id)?;
    let gate = ReputationGate::from_settings(&settings.reputation)?;

    let bot = Bot::new(&settings.bot_token);
    let me = bot.get_me().await.context("get bot identity")?;
    log::info!("Authorized as @{}", me.username());

    let transport: Arc<dyn ChatTransport> = if settings.dry_run {
        log::warn!("Dry run: chat actions are only logged");
        Arc::new(DryRunTransport)
    } else {
        Arc::new(TelegramTransport::new(bot.clone()))
    };

    Maintenance::new(store.clone(), Arc::clone(&transport)).spawn();

    let moderator = Arc::new(Moderator::new(store.clone(), gate, transport, rules, paths).with_bot_id(me.id.0));
    run_dispatcher(bot, me, moderator).await;

    store.save().await?;
    log::info!("Cache saved, bye");
    Ok(())
}
