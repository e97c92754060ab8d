pub mod cli;
pub mod error;
pub mod llm;
pub mod models;
pub mod responder;
pub mod server;

use cli::Args;
use log::info;
use responder::ChatResponder;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Backend: {}", args.backend);
    info!("Model: {}", args.model);
    info!("Revision: {}", args.revision);
    info!("Device: {}", args.device);
    if args.backend.eq_ignore_ascii_case("ollama") {
        info!("Ollama Base URL: {}", args.ollama_base_url);
    }
    info!("Max Length: {}", args.max_length);
    info!("Sampling: {}", args.do_sample);
    if args.do_sample {
        info!("Temperature: {}", args.temperature);
        info!("Top K: {}", args.top_k);
        info!("Top P: {}", args.top_p);
        info!("Seed: {:?}", args.seed);
    }
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    // The model is loaded before anything listens: a bad checkpoint means no interface.
    let responder = ChatResponder::from_args(&args).await?;
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, responder, args);
    server.run().await?;

    Ok(())
}
