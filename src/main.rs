use anyhow::{anyhow, Context};
use log::{info, LevelFilter};
use std::sync::{
    mpsc::{self, Receiver, Sender},
    Arc,
};
use weatherface::{
    clock::SystemClock,
    companion::{http::HttpLink, memory::MemoryLink, CompanionLink},
    config::Config,
    engine::Engine,
    event::FaceEvent,
    input,
    screen::Screen,
};

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module("weatherface", LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = Config::load()?;
    let (sender, receiver) = mpsc::channel();

    let ctrlc_sender = sender.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_sender.send(FaceEvent::Shutdown);
    })
    .context("Error setting Ctrl-C handler")?;

    match &config.companion_url {
        Some(url) => {
            run(&config, Arc::new(HttpLink::new(url)), sender, receiver)
        }
        None => {
            info!("No companion configured, weather will stay empty");
            run(&config, Arc::new(MemoryLink::new()), sender, receiver)
        }
    }
}

fn run<L: CompanionLink>(
    config: &Config,
    link: Arc<L>,
    sender: Sender<FaceEvent>,
    receiver: Receiver<FaceEvent>,
) -> anyhow::Result<()> {
    info!("Using companion {}", link.name());
    let mut screen = Screen::new(&config.screen, config.snapshot_path.clone());
    let engine = Engine::new(
        config,
        SystemClock::new(config.hour_format),
        link,
        sender.clone(),
    )?;

    // What the platform reports when the face is first attached
    for event in [
        FaceEvent::InsetsApplied(config.screen.shape),
        FaceEvent::PropertiesChanged {
            low_bit_ambient: config.screen.low_bit_ambient,
        },
        FaceEvent::VisibilityChanged(true),
    ] {
        sender
            .send(event)
            .map_err(|_| anyhow!("Event queue closed"))?;
    }
    input::spawn_console(sender.clone(), screen.bounds().size);
    input::spawn_time_ticks(sender);
    println!("Type `help` for commands, Ctrl-c to exit...");

    engine.run(receiver, &mut screen)
}
