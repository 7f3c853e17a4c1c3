use gallery_preload::{
    ContentCache, HttpTransport, ItemId, MuteList, OwnerId, PreloadScheduler, ResolvedItem,
    SchedulerSnapshot, Settings, SharedOwner, Transport, preload::scheduler::Target,
};
use log::info;
use std::{error::Error, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const USAGE: &str =
    "commands: view <id> | next [id] | info <id> | owner <id> | hint <item> <owner> | status | clear | quit";

enum AppEvent {
    Input(String),
    InputClosed,
    ItemReady(ResolvedItem),
    OwnerReady(Arc<SharedOwner>),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load();

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&settings)?);
    let cache = ContentCache::new(transport.clone(), settings.endpoints.clone());
    let mute = Arc::new(MuteList::from_settings(&settings));
    let scheduler = PreloadScheduler::new(
        cache.clone(),
        transport,
        mute,
        settings.preload.clone(),
    );

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();
    spawn_input_reader(event_tx.clone());

    info!("browsing {}", settings.base_url);
    println!("{USAGE}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            Some(event) = event_rx.recv() => match event {
                AppEvent::Input(line) => {
                    if !handle_command(&line, &cache, &scheduler, &event_tx).await {
                        break;
                    }
                }
                AppEvent::InputClosed => break,
                AppEvent::ItemReady(resolved) => print_item(&resolved),
                AppEvent::OwnerReady(owner) => {
                    let owner = owner.get();
                    println!("owner {}: {}", owner.id, owner.name);
                }
            }
        }
    }

    scheduler.clear();
    Ok(())
}

fn spawn_input_reader(tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(AppEvent::Input(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(AppEvent::InputClosed);
    });
}

/// Returns false when the user asked to quit.
async fn handle_command(
    line: &str,
    cache: &ContentCache,
    scheduler: &PreloadScheduler,
    tx: &mpsc::UnboundedSender<AppEvent>,
) -> bool {
    let mut parts = line.split_whitespace();

    match (parts.next(), parts.next(), parts.next()) {
        (None, _, _) => {}
        (Some("view"), Some(id), None) => {
            scheduler.set_current_target(Some(ItemId::new(id))).await;
        }
        (Some("next"), id, None) => {
            scheduler.set_speculative_target(id.map(ItemId::new)).await;
        }
        (Some("info"), Some(id), None) => {
            let tx = tx.clone();
            cache
                .request_item(
                    ItemId::new(id),
                    Some(Box::new(move |item| {
                        let _ = tx.send(AppEvent::ItemReady(item));
                    })),
                )
                .await;
        }
        (Some("owner"), Some(id), None) => {
            let tx = tx.clone();
            cache
                .request_owner(
                    OwnerId::new(id),
                    Some(Box::new(move |owner| {
                        let _ = tx.send(AppEvent::OwnerReady(owner));
                    })),
                )
                .await;
        }
        (Some("hint"), Some(item), Some(owner)) => {
            cache
                .note_owner_for_item(ItemId::new(item), OwnerId::new(owner))
                .await;
        }
        (Some("status"), None, None) => print_status(&scheduler.snapshot()),
        (Some("clear"), None, None) => scheduler.clear(),
        (Some("quit"), None, None) => return false,
        _ => eprintln!("{USAGE}"),
    }

    true
}

fn print_item(resolved: &ResolvedItem) {
    let item = &resolved.item;
    let owner = resolved.owner.get();
    println!(
        "{} | {} | by {} | {:?} | {} page(s) | tags: {}",
        item.id,
        item.title,
        owner.name,
        item.kind,
        item.pages.len(),
        item.tags.join(", ")
    );
}

fn print_status(snapshot: &SchedulerSnapshot) {
    let describe = |target: Option<&Target>| match target {
        Some(t) if t.metadata.is_some() => t.id.to_string(),
        Some(t) => format!("{} (loading)", t.id),
        None => "-".to_string(),
    };

    println!("current: {}", describe(snapshot.targets.current.as_ref()));
    println!("next:    {}", describe(snapshot.targets.speculative.as_ref()));
    for entry in &snapshot.active {
        println!("  [{:?}] {}", entry.state, entry.url);
    }
    println!("recently completed: {}", snapshot.recently_completed);
}
