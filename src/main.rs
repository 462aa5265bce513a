use std::env;
use std::process;

use log_tailer::{TailEvent, TailOptions, Tailer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <file_path> [<file_path>...]", args[0]);
        process::exit(1);
    }

    let mut tails = Vec::new();
    for path in &args[1..] {
        match Tailer::new(path, TailOptions::default()).await {
            Ok(tailer) => {
                println!("Tailing file: {}", path);
                tails.push(tokio::spawn(run_tail(path.clone(), tailer)));
            }
            Err(e) => {
                eprintln!("Error setting up tail for {}: {}", path, e);
                process::exit(1);
            }
        }
    }

    for tail in tails {
        let _ = tail.await;
    }
}

async fn run_tail(path: String, mut tailer: Tailer) {
    while let Some(event) = tailer.next_event().await {
        match event {
            TailEvent::Line { text, number } => println!("{}:{}: {}", path, number, text),
            TailEvent::Drain(ack) => ack.ack(),
            TailEvent::End => {}
            TailEvent::IrrelevantFile(_) => {}
            TailEvent::Error(e) => eprintln!("Error reading {}: {}", path, e),
        }
    }
}
