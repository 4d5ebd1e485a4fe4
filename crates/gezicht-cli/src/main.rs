use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod client;
mod known;
mod stream;

use client::ServerProcess;
use stream::StreamSocket;

#[derive(Parser)]
#[command(name = "gezicht", about = "Gezicht face recognition client")]
struct Cli {
    /// gezichtd binary to spawn
    #[arg(long, global = true, env = "GEZICHT_SERVER", default_value = "gezichtd")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct KnownFaces {
    /// Learn a person from an image before detecting (repeatable)
    #[arg(long = "face", value_name = "NAME=PATH", value_parser = known::parse_face)]
    faces: Vec<(String, PathBuf)>,

    /// Encodings cache to restore before detecting
    #[arg(long, value_name = "FILE")]
    encodings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn a person from one or more images and print the encodings
    Learn {
        name: String,

        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Merge the learned encodings into this cache file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
    /// Detect and name faces in one or more image files, one request each
    Detect {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        #[command(flatten)]
        known: KnownFaces,
    },
    /// Detect and name faces in a camera frame
    Picam {
        #[command(flatten)]
        known: KnownFaces,
    },
    /// Send an image through a Unix socket and detect faces in it
    Stream {
        file: PathBuf,

        #[command(flatten)]
        known: KnownFaces,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut server = ServerProcess::spawn(&cli.server)?;

    let outcome = run(&mut server, cli.command).await;
    let shutdown = server.shutdown().await;

    let result = outcome?;
    shutdown?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run(server: &mut ServerProcess, command: Commands) -> Result<Value> {
    let conn = server.connection();

    match command {
        Commands::Learn { name, paths, save } => {
            let result = conn.learn_face(&name, &paths).await?;
            if let Some(cache_path) = save {
                let mut cache = known::load_cache(&cache_path)?;
                cache
                    .entry(name.clone())
                    .or_default()
                    .extend(known::learned_encodings(&result)?);
                known::save_cache(&cache_path, &cache)?;
                tracing::info!(name, cache = %cache_path.display(), "saved encodings");
            }
            Ok(result)
        }
        Commands::Detect { images, known } => {
            restore(conn, &known).await?;
            let results = conn.detect_faces(&images).await?;
            Ok(Value::Array(results))
        }
        Commands::Picam { known } => {
            restore(conn, &known).await?;
            conn.detect_picam().await
        }
        Commands::Stream { file, known } => {
            restore(conn, &known).await?;
            let socket = StreamSocket::serve_file(&file).await?;
            let result = conn.detect_stream(socket.path()).await;
            let sent = socket.finish().await?;
            tracing::debug!(bytes = sent, "stream finished");
            result
        }
    }
}

async fn restore(
    conn: &mut client::Connection<tokio::process::ChildStdin>,
    faces: &KnownFaces,
) -> Result<()> {
    let cache = match &faces.encodings {
        Some(path) => known::load_cache(path).context("loading encodings cache")?,
        None => known::EncodingCache::new(),
    };
    let people = known::restore(conn, &cache, &faces.faces).await?;
    tracing::info!(people, "known faces registered");
    Ok(())
}
