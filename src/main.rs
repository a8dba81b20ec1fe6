//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run the bot.
//! No business logic here; routing is delegated to the Router use case.

use desk_relay::adapters::integrations::{RusprofileAdapter, StaticRegistry};
use desk_relay::adapters::persistence::{
    MemoryApprovalStore, MemoryConversationStore, MemorySupportTags, SqliteRepo,
};
use desk_relay::adapters::telegram::{TeloxideTransport, run_event_loop, spawn_polling};
use desk_relay::adapters::tools::{SofficeConverter, UmyaSpreadsheet};
use desk_relay::ports::{DocumentConverter, EventHandler, RegistryLookup, Transport};
use desk_relay::shared::clock::LocalClock;
use desk_relay::shared::config::{AppConfig, Profile};
use desk_relay::usecases::{
    ApplicationService, ApprovalService, Broadcaster, Desk, InboxService, InvoiceService,
    NavigatorService, RelayService, Reminder, Router, SchedulerService,
};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    let cfg = AppConfig::load().map_err(|e| anyhow::anyhow!("config: {}", e))?;
    cfg.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
    let profile = cfg.profile();
    let token = cfg.bot_token().unwrap_or_default().to_string();
    let password = cfg.access_password().unwrap_or_default().to_string();
    let clock = LocalClock::new(cfg.utc_offset_hours_or_default());

    let data_path = cfg.data_dir_or_default();
    let repo = Arc::new(
        SqliteRepo::connect(&data_path, cfg.invoice_start_or_default())
            .await
            .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
    );
    info!(path = %repo.path().display(), ?profile, "storage ready");

    let bot = Bot::new(token);
    let transport: Arc<dyn Transport> = Arc::new(TeloxideTransport::new(bot.clone()));

    let responders = cfg.responders();
    if responders.is_empty() {
        warn!("no responders configured, staff replies will be ignored");
    }
    let staff_chats = cfg.staff_chats();
    let relay = Arc::new(RelayService::new(
        Arc::clone(&transport),
        repo.clone(),
        Arc::new(MemorySupportTags::new()),
        responders,
        cfg.chats.navigator,
        cfg.mirror_chats(),
    ));

    // --- Desk per profile ---
    let mut approval = None;
    let desk = match profile {
        Profile::Category => Desk::Category(cfg.chats.categories.clone()),
        Profile::Accounting => Desk::Accounting(cfg.chats.accounting),
        Profile::Application => {
            let converter: Option<Arc<dyn DocumentConverter>> = if cfg.converter.enabled {
                let bin = cfg.converter.soffice_path.as_deref().unwrap_or("soffice");
                let timeout = Duration::from_secs(cfg.converter_timeout_secs_or_default());
                info!(bin, "PDF conversion enabled");
                Some(Arc::new(SofficeConverter::new(bin, timeout)))
            } else {
                None
            };
            let invoices = Arc::new(InvoiceService::new(
                repo.clone(),
                Arc::new(UmyaSpreadsheet::new()),
                converter,
                cfg.template_path_or_default(),
                cfg.output_dir_or_default(),
                cfg.vat_rate_or_default(),
                clock,
            ));
            let approval_service = Arc::new(ApprovalService::new(
                Arc::clone(&transport),
                Arc::new(MemoryApprovalStore::new()),
                invoices,
                relay.clone(),
                cfg.chats.approval,
            ));
            approval = Some(approval_service.clone());

            let registry: Arc<dyn RegistryLookup> = if cfg.registry_enabled() {
                let timeout = Duration::from_secs(cfg.registry_timeout_secs_or_default());
                Arc::new(
                    RusprofileAdapter::new(cfg.registry_base_url_or_default(), timeout)
                        .map_err(|e| anyhow::anyhow!("{}", e))?,
                )
            } else {
                info!("registry lookup disabled");
                Arc::new(StaticRegistry::disabled())
            };
            Desk::Application(Arc::new(ApplicationService::new(
                Arc::clone(&transport),
                Arc::new(MemoryConversationStore::new()),
                registry,
                relay.clone(),
                approval_service,
                cfg.application.companies.clone(),
            )))
        }
    };
    let inbox = Arc::new(InboxService::new(
        Arc::clone(&transport),
        repo.clone(),
        relay.clone(),
        desk,
        password,
    ));

    // --- Broadcasts and scheduler ---
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&transport),
        repo.clone(),
        staff_chats.clone(),
    ));
    let mut router = Router::new(Arc::clone(&transport), inbox, relay.clone(), staff_chats);
    if let Some(approval) = approval {
        router = router.with_approval(approval);
    }
    if cfg.broadcast.enabled {
        if cfg.chats.navigator == 0 {
            warn!("broadcasts enabled but no navigator chat configured");
        }
        router = router.with_navigator(Arc::new(NavigatorService::new(
            Arc::clone(&transport),
            repo.clone(),
            repo.clone(),
            broadcaster.clone(),
            relay.clone(),
            clock,
        )));
    }

    let reminder = cfg.reminder.enabled.then(|| {
        let (hour, minute) = cfg.reminder_time_or_default();
        Reminder {
            hour,
            minute,
            text: cfg.reminder_text_or_default(),
        }
    });
    if reminder.is_some() || cfg.broadcast.enabled {
        let scheduler = SchedulerService::new(
            broadcaster,
            repo.clone(),
            reminder,
            clock,
            Duration::from_secs(cfg.tick_secs_or_default()),
        );
        tokio::spawn(async move {
            scheduler.run().await;
        });
    }

    // --- Run: polling feeds one sequential consumer ---
    let (rx, polling) = spawn_polling(bot);
    let handler: Arc<dyn EventHandler> = Arc::new(router);
    run_event_loop(rx, handler).await;
    polling
        .await
        .map_err(|e| anyhow::anyhow!("polling task: {}", e))?;
    info!("shutdown complete");
    Ok(())
}
