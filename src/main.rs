use std::sync::Arc;

use outreach_engine::bus::TokioEventBus;
use outreach_engine::channels::{HeyreachChannel, SmartleadChannel};
use outreach_engine::config::{EngineConfig, TenantConfig};
use outreach_engine::events::ProviderMappings;
use outreach_engine::events::webhook::{WebhookState, webhook_routes};
use outreach_engine::llm::{LlmBackend, LlmConfig, create_provider};
use outreach_engine::notify::WebhookNotifier;
use outreach_engine::orchestrator::{Engine, EngineDeps};
use outreach_engine::reply::LlmReplyClassifier;
use outreach_engine::store::{Database, LibSqlBackend};
use outreach_engine::sweep::{SweepDriver, SweepSchedule};
use outreach_engine::waterfall::WaterfallResolver;
use outreach_engine::waterfall::routes::{ResearchRouteState, research_routes};
use outreach_engine::waterfall::stages::{
    EvidenceStage, OrganizationSourceStage, PersonalSourceStage, WebSearchStage,
};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, optionally also to a rolling file.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _file_guard = match std::env::var("OUTREACH_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "outreach-engine.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
            None
        }
    };

    let config = EngineConfig::from_env()?;

    let tenant_id: uuid::Uuid = std::env::var("OUTREACH_TENANT_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| {
            eprintln!("Error: OUTREACH_TENANT_ID not set or not a UUID");
            std::process::exit(1);
        });
    let tenant = TenantConfig::from_env(tenant_id)?;

    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });
    let model = std::env::var("OUTREACH_CLASSIFIER_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    eprintln!("📬 Outreach Engine v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Classifier model: {}", model);
    eprintln!("   Webhooks: http://{}/webhooks/{{smartlead,heyreach}}", config.bind_addr);
    eprintln!("   Database: {}", config.db_path);

    let llm = create_provider(&LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    })?;

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
                std::process::exit(1);
            }),
    );

    let (bus, mut bus_rx) = TokioEventBus::new(256);

    let engine = Arc::new(Engine::new(
        config.clone(),
        EngineDeps {
            store: Arc::clone(&db),
            email: Arc::new(SmartleadChannel::new(tenant.smartlead.clone())),
            linkedin: Arc::new(HeyreachChannel::new(tenant.heyreach.clone())),
            classifier: Arc::new(LlmReplyClassifier::new(llm)),
            notifier: Arc::new(WebhookNotifier::new(
                std::env::var("OUTREACH_ALERT_WEBHOOK_URL").ok(),
            )),
            bus: Arc::new(bus),
        },
    ));

    // Bus consumer: ticks and resumes, serialized per lead by the CAS.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            while let Some(event) = bus_rx.recv().await {
                if let Err(e) = engine.handle_bus_event(event).await {
                    tracing::warn!(error = %e, "Bus event handling failed");
                }
            }
        });
    }

    // Sweep driver: forces progress on expired waits.
    let sweep = SweepDriver::new(
        Arc::clone(&engine),
        SweepSchedule::from_env(config.sweep_interval)?,
    );
    tokio::spawn(sweep.run());

    // Waterfall evidence stages, each enabled by its own env pair.
    let mut stages: Vec<Box<dyn EvidenceStage>> = Vec::new();
    if let (Ok(url), Ok(key)) = (
        std::env::var("EVIDENCE_PERSONAL_URL"),
        std::env::var("EVIDENCE_PERSONAL_API_KEY"),
    ) {
        stages.push(Box::new(PersonalSourceStage::new(
            url,
            secrecy::SecretString::from(key),
        )));
    }
    if let (Ok(url), Ok(key)) = (
        std::env::var("EVIDENCE_ORGANIZATION_URL"),
        std::env::var("EVIDENCE_ORGANIZATION_API_KEY"),
    ) {
        stages.push(Box::new(OrganizationSourceStage::new(
            url,
            secrecy::SecretString::from(key),
        )));
    }
    if let (Ok(url), Ok(key)) = (
        std::env::var("EVIDENCE_WEB_SEARCH_URL"),
        std::env::var("EVIDENCE_WEB_SEARCH_API_KEY"),
    ) {
        stages.push(Box::new(WebSearchStage::new(
            url,
            secrecy::SecretString::from(key),
        )));
    }
    if stages.is_empty() {
        tracing::warn!("No evidence stages configured; research resolution will return empty");
    }
    let resolver = Arc::new(WaterfallResolver::new(stages));

    // Webhook + research surface.
    let app = webhook_routes(WebhookState {
        engine,
        mappings: Arc::new(ProviderMappings::builtin()),
        smartlead_secret: tenant.smartlead.webhook_secret.clone(),
        heyreach_secret: tenant.heyreach.webhook_secret.clone(),
    })
    .merge(research_routes(ResearchRouteState {
        resolver,
        store: Arc::clone(&db),
    }))
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Webhook listener up");
    axum::serve(listener, app).await?;

    Ok(())
}
