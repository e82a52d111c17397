//! Print the detected platform and what each store currently serves.
//!
//! `KINESPHERE_PLATFORM=android|ios` simulates a native bridge; unset means
//! a desktop browser. Other settings come from `KINESPHERE_*` variables.

use std::sync::Arc;

use anyhow::Context;
use kinesphere_core::logging::init_logging;
use kinesphere_core::platform::{NativeBridge, StaticProbe};
use kinesphere_core::store::browser::BrowserStore;
use kinesphere_core::store::embedded::{DbLocation, EmbeddedStore};
use kinesphere_core::store::kv::DirectoryArea;
use kinesphere_core::{
    Config, PersistenceRouter, PlatformDetector, RemoteClient, RemoteStore, RouterSettings,
    RuntimeEnvironment,
};

fn simulated_environment() -> RuntimeEnvironment {
    match std::env::var("KINESPHERE_PLATFORM") {
        Ok(name) => RuntimeEnvironment {
            bridge: Some(NativeBridge {
                platform_name: Some(name.clone()),
                plugins: Some(vec!["CapacitorSQLite".to_string()]),
            }),
            legacy_bridge: None,
            user_agent: format!("kinesphere-diag ({})", name),
        },
        Err(_) => RuntimeEnvironment {
            user_agent: "kinesphere-diag (desktop)".to_string(),
            ..Default::default()
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");

    let config = Config::from_env().context("reading KINESPHERE_* configuration")?;
    tracing::info!("Using data directory: {}", config.data_dir.display());
    tracing::info!("Using backend: {}", config.remote_base_url);

    let mut detector = PlatformDetector::new(StaticProbe(simulated_environment()))
        .with_force_browser_mode(config.force_browser_mode);
    let info = detector.debug_info();
    tracing::info!("{}", serde_json::to_string_pretty(&info)?);
    let profile = detector.detect();

    let embedded = Arc::new(EmbeddedStore::new(DbLocation::File(config.database_path())));
    if profile.is_native_embedded_capable {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating {}", config.data_dir.display()))?;
        embedded
            .init(&profile)
            .await
            .context("opening embedded database")?;
    }
    let browser = Arc::new(BrowserStore::new(Arc::new(DirectoryArea::new(
        config.web_storage_dir(),
    ))));
    let client = RemoteClient::new(&config.remote_base_url, config.remote_timeout)?
        .with_retries(config.remote_retries);
    let router = PersistenceRouter::new(
        profile,
        embedded,
        browser,
        Arc::new(RemoteStore::new(client)),
        RouterSettings {
            ready_timeout: config.ready_timeout,
        },
    );

    let patients = router.list_patients().await;
    tracing::info!("{}", patients.status);
    for patient in &patients.value {
        tracing::info!(
            "  {} {}{}",
            patient.id,
            patient.name,
            if patient.is_demo { " (demo)" } else { "" }
        );
    }

    let stats = router.compute_stats().await;
    tracing::info!("{}", serde_json::to_string_pretty(&stats.value)?);
    Ok(())
}
