use std::{sync::Arc, time::Duration};

use anyhow::Result;
use quote_sync::{
    config::{self, store::JsonFileConfigStore},
    coordinator::RefreshEvent,
    engine::Engine,
    logging,
    util::http::ReqwestClient,
};
use tokio::sync::broadcast::error::RecvError;

#[cfg(all(target_os = "linux", target_env = "musl"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 多久檢查一次設定檔是否被外部修改
const RELOAD_INTERVAL: Duration = Duration::from_secs(5);

fn describe(event: &RefreshEvent) -> String {
    let snapshot = &event.snapshot;
    let mut lines = vec![format!(
        "{} {} ({} entries, {} absent)",
        event.category,
        event.kind,
        snapshot.len(),
        snapshot.absent_count()
    )];

    for entry in &snapshot.entries {
        let line = match &entry.quote {
            Some(quote) => format!(
                "{}{} {} {} {}%{}",
                if entry.entry.pinned { "*" } else { " " },
                entry.code(),
                quote.name,
                quote.current_value,
                quote.change_percent,
                if entry.stale { " (stale)" } else { "" }
            ),
            None => format!(
                " {} unavailable {}",
                entry.code(),
                entry
                    .error
                    .as_ref()
                    .map(|why| why.to_string())
                    .unwrap_or_default()
            ),
        };
        lines.push(line);
    }

    lines.join("\r\n")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let app = &*config::SETTINGS;
    let store = Arc::new(JsonFileConfigStore::open(&app.system.watch_list_file));
    let client = ReqwestClient::shared()?;
    let engine = Engine::new(store.clone(), client, app);

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => logging::info_console(describe(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    logging::warn_file_async(format!("Skipped {} refresh events", skipped))
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let reloader = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RELOAD_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(why) = store.reload() {
                    logging::error_file_async(format!("Failed to reload settings because {:?}", why));
                }
            }
        })
    };

    engine.start().await;
    logging::info_console(format!(
        "quote_sync started, watch list {}, Rust OS/Arch: {}/{}",
        app.system.watch_list_file,
        std::env::consts::OS,
        std::env::consts::ARCH
    ));

    tokio::signal::ctrl_c().await?;

    engine.stop();
    reloader.abort();
    printer.abort();
    logging::info_console("quote_sync stopped".to_string());

    Ok(())
}
