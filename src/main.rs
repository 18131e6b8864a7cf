#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use tokio::io::BufReader;

mod action;
mod channels;
mod color;
mod config; use config::*;
mod engine; use engine::*;
mod error;
mod fade;
mod ingress;
mod interpreter;
mod lights;
mod registry;
mod sink; use sink::{NullSink, OlaSink, Sink};
mod tempo; use tempo::Tempo;

#[tokio::main]
async fn main() -> Result<()> {
    let args = std::env::args().collect::<Vec<_>>();
    if args.len() > 1 && args[1] == "-v" {
        std::env::set_var("RUST_LOG", "trace");
    } else if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "debug");
    }
    pretty_env_logger::init();

    let config = Config::from_env()?;
    log::debug!("{:?}", config);

    let sink: Box<dyn Sink> = match config.sink {
        SinkKind::Ola => match OlaSink::spawn(config.universe) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                log::warn!("{:?}, frames will be dropped", e);
                Box::new(NullSink)
            }
        },
        SinkKind::Null => Box::new(NullSink),
    };
    let (frames, _sink) = sink::spawn(sink);

    let engine = Arc::new(Engine::new(frames, Tempo::new(config.tempo, config.analyzer)));
    if config.boot_show {
        engine.submit(lights::boot_show());
    }

    log::info!("reading commands from stdin");
    ingress::serve(engine.clone(), BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    log::info!("stdin closed, playing until interrupted");
    tokio::signal::ctrl_c().await?;
    engine.stop_all().await;
    Ok(())
}
