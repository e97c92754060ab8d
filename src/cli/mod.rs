use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Generation Backend Args ---
    /// Backend that produces replies (local, ollama)
    #[arg(long, env = "CHAT_BACKEND", default_value = "local")]
    pub backend: String,

    /// Checkpoint identifier: a Hugging Face repo id or a local directory (local backend),
    /// or a model tag (ollama backend)
    #[arg(long, env = "CHAT_MODEL", default_value = "microsoft/DialoGPT-small")]
    pub model: String,

    /// Hub revision (branch, tag or commit) used when the checkpoint is fetched remotely
    #[arg(long, env = "CHAT_MODEL_REVISION", default_value = "main")]
    pub revision: String,

    /// Device for the local backend (cpu, cuda, cuda:N)
    #[arg(long, env = "CHAT_DEVICE", default_value = "cpu")]
    pub device: String,

    /// Base URL of the Ollama server (ollama backend only)
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    // --- Generation Args ---
    /// Hard cap on the total sequence length (input plus reply tokens)
    #[arg(long, env = "MAX_LENGTH", default_value = "1000")]
    pub max_length: usize,

    /// Sample from the distribution instead of taking the most likely token
    #[arg(long, env = "DO_SAMPLE", default_value = "false")]
    pub do_sample: bool,

    /// Softmax temperature when sampling
    #[arg(long, env = "TEMPERATURE", default_value = "1.0")]
    pub temperature: f64,

    /// Keep only the k most likely tokens when sampling (0 disables)
    #[arg(long, env = "TOP_K", default_value = "50")]
    pub top_k: usize,

    /// Nucleus sampling mass (1.0 disables)
    #[arg(long, env = "TOP_P", default_value = "1.0")]
    pub top_p: f64,

    /// Fixed RNG seed for sampling. Every request reuses it, so replies are reproducible.
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:7860")]
    pub server_addr: String,

    /// Optional API Key required for the predict endpoints. If set, clients must provide it
    /// in the X-API-Key header or the api_key query parameter.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Global request rate limit for the predict endpoints, per second. 0 disables it.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "0")]
    pub rate_limit: u32,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_demo_checkpoint() {
        let args = Args::try_parse_from(["chat-responder"]).unwrap();
        assert_eq!(args.backend, "local");
        assert_eq!(args.model, "microsoft/DialoGPT-small");
        assert_eq!(args.max_length, 1000);
        assert!(!args.do_sample);
        assert_eq!(args.seed, None);
        assert_eq!(args.server_addr, "127.0.0.1:7860");
        assert_eq!(args.rate_limit, 0);
        assert!(!args.enable_tls);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "chat-responder",
            "--backend",
            "ollama",
            "--model",
            "llama3",
            "--max-length",
            "64",
            "--do-sample",
            "--seed",
            "7",
        ])
        .unwrap();
        assert_eq!(args.backend, "ollama");
        assert_eq!(args.model, "llama3");
        assert_eq!(args.max_length, 64);
        assert!(args.do_sample);
        assert_eq!(args.seed, Some(7));
    }
}
