use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use tunebridge::backends::catalog::{CatalogFixture, CatalogHandle};
use tunebridge::config::{default_config_path, load_or_create, Config};
use tunebridge::credentials::StaticCredentials;
use tunebridge::play_queue::LoggingPlayQueue;
use tunebridge::prop_tree::{PropNode, PropTree, PropValue};
use tunebridge::{Collaborators, ContentBridge};

const PAGE_TIMEOUT: Duration = Duration::from_secs(5);

fn load_config() -> Config {
    let Some(path) = default_config_path() else {
        warn!("No config directory available, using defaults");
        return Config::default();
    };
    match load_or_create(&path) {
        Ok(config) => config,
        Err(err) => {
            warn!("Failed to load {}: {}. Using defaults", path.display(), err);
            Config::default()
        }
    }
}

/// Polls until `node` reports loading finished or the timeout expires.
fn wait_loaded(node: &PropNode) {
    let deadline = Instant::now() + PAGE_TIMEOUT;
    while node.get("loading").and_then(|loading| loading.int()) != Some(0) {
        if Instant::now() >= deadline {
            warn!("Timed out waiting for page to load");
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn format_value(value: PropValue) -> Option<String> {
    match value {
        PropValue::Void => None,
        PropValue::Str(text) => Some(format!("{text:?}")),
        PropValue::Int(value) => Some(value.to_string()),
        PropValue::Float(value) => Some(format!("{value:.3}")),
        PropValue::Link { title, url } => Some(format!("{title:?} -> {url}")),
    }
}

fn print_tree(node: &PropNode, depth: usize) {
    let name = node.name().unwrap_or_else(|| "*".to_string());
    match format_value(node.value()) {
        Some(value) => println!("{:indent$}{} = {}", "", name, value, indent = depth * 2),
        None => println!("{:indent$}{}", "", name, indent = depth * 2),
    }
    for child in node.children() {
        print_tree(&child, depth + 1);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let mut args = std::env::args().skip(1);
    let Some(catalog_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: tunebridge <catalog.json> <uri>...");
        std::process::exit(2);
    };
    let uris: Vec<String> = args.collect();

    let config = load_config();
    let fixture = CatalogFixture::load(&catalog_path)?;
    let credentials = match fixture.users.first() {
        Some(user) => StaticCredentials::new(&user.username, &user.password),
        None => StaticCredentials::new("guest", ""),
    };
    let catalog = CatalogHandle::new(fixture);
    let play_queue = Arc::new(LoggingPlayQueue::new());

    let bridge = ContentBridge::new(
        config,
        Collaborators {
            tree: PropTree::new(),
            credentials: Arc::new(credentials),
            play_queue: play_queue.clone(),
        },
        catalog.factory(),
    );
    info!("Session status: {:?}", bridge.status().string());

    for uri in &uris {
        if !bridge.can_handle(uri) {
            warn!("Skipping {}: not a service URI", uri);
            continue;
        }
        println!("== {uri}");
        match bridge.open(uri, None) {
            Ok(Some(page)) => {
                wait_loaded(&page);
                print_tree(&page, 0);
            }
            Ok(None) => println!("queued track {uri}"),
            Err(err) => println!("error: {err}"),
        }
    }

    bridge.shutdown();
    info!("Queued tracks: {:?}", play_queue.uris());
    Ok(())
}
