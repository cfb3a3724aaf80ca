mod command;
mod render;

use command::Command;
use gallery::debounce::Debouncer;
use gallery::janitor::{DEFAULT_JANITOR_PERIOD, run_janitor};
use gallery::persistence::{MemoryStorage, PersistOptions, Persister, SledStorage};
use gallery::ports::SnapshotStorage;
use gallery::provider::{DEFAULT_REQUEST_TIMEOUT, UnsplashClient};
use gallery::{BrowseSession, CacheKey, Gallery, Payload, QueryStore};
use shared::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout belongs to the gallery itself.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Unsplash Gallery");

    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();

    let storage: Arc<dyn SnapshotStorage> = match SledStorage::open(config.sled_path()) {
        Ok(storage) => {
            info!(path = %config.sled_path().display(), "Cache persistence enabled");
            Arc::new(storage)
        }
        Err(e) => {
            warn!("Failed to open cache storage: {}. Running in-memory mode.", e);
            Arc::new(MemoryStorage::new())
        }
    };

    let provider = match UnsplashClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            warn!("{}. Only cached photos will be available.", e);
            UnsplashClient::new(&config.api_url, "", DEFAULT_REQUEST_TIMEOUT)?
        }
    };

    let store: QueryStore<Payload> = QueryStore::new();
    let persister = Persister::new(store.clone(), storage, PersistOptions::from_config(&config));
    if !persister.is_cache_healthy(store.now()) {
        warn!("Persisted cache was unhealthy and has been cleared");
    }
    let outcome = persister.restore();
    info!(?outcome, "Cache restore finished");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let persister_handle = {
        let persister = persister.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { persister.run(shutdown).await })
    };
    let janitor_handle = tokio::spawn(run_janitor(
        store.clone(),
        DEFAULT_JANITOR_PERIOD,
        shutdown_tx.subscribe(),
    ));

    let gallery = Gallery::from_config(Arc::new(provider), store.clone(), &config);
    let mut session = BrowseSession::new(gallery);
    let mut debouncer = Debouncer::spawn(Duration::from_millis(config.debounce_ms));
    let mut events = store.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    println!("{}\n", command::HELP);
    println!("{}", render::view(&session.render()));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                };

                match command::parse(&line) {
                    Command::Input(text) => {
                        session.set_raw_query(text.clone());
                        debouncer.push(text);
                        if session.render().is_searching {
                            println!("[searching]");
                        }
                    }
                    Command::Page(page) => {
                        session.go_to_page(page);
                        println!("{}", render::view(&session.render()));
                    }
                    Command::Next => {
                        session.next_page();
                        println!("{}", render::view(&session.render()));
                    }
                    Command::Prev => {
                        session.prev_page();
                        println!("{}", render::view(&session.render()));
                    }
                    Command::Photo(id) => match session.open_photo(&id) {
                        Some(entry) => println!("{}", render::photo(&entry)),
                        None => println!("Loading photo {}...", id),
                    },
                    Command::Stats => {
                        println!("{}", render::stats(persister.cache_stats().as_ref(), store.now()));
                    }
                    Command::Clear => {
                        persister.clear_persisted();
                        store.clear();
                        session.refresh();
                        println!("Cache cleared");
                    }
                    Command::Help => println!("{}", command::HELP),
                    Command::Quit => break,
                    Command::Unknown(input) => println!("Unknown command: {} (try :help)", input),
                }
            }

            Some(settled) = debouncer.recv() => {
                session.apply_debounced(settled);
                println!("{}", render::view(&session.render()));
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(entry) = event.key().and_then(|key| session.settled_photo(key)) {
                            println!("{}", render::photo(&entry));
                        }

                        let settled = event
                            .key()
                            .filter(|key| on_screen(&session, key))
                            .and_then(|key| store.peek(key))
                            .is_some_and(|entry| !entry.is_fetching);
                        if settled {
                            println!("{}", render::view(&session.render()));
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Display fell behind cache updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = &mut shutdown => break,
        }
    }

    info!("Shutting down");
    drop(session);
    drop(debouncer);
    let _ = shutdown_tx.send(());
    if let Err(e) = persister_handle.await {
        error!("Cache persister task failed: {}", e);
    }
    if let Err(e) = janitor_handle.await {
        error!("Cache janitor task failed: {}", e);
    }

    info!("Gallery stopped");
    Ok(())
}

fn on_screen(session: &BrowseSession, key: &CacheKey) -> bool {
    session.search_key() == Some(key) || *key == session.gallery().random_key()
}

// Graceful shutdown handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
