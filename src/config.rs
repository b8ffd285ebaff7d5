use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "drawthings-cache")]
#[command(about = "Caching proxy for the Draw Things image generation API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Generation backend, scheme optional ("localhost:7860" works)
    #[arg(short, long, env = "DRAWTHINGS_API_URL", default_value = "http://localhost:7860")]
    pub backend_url: String,

    // Directory holding generated images
    #[arg(short, long, env = "CACHE_DIR", default_value = "cache")]
    pub cache_dir: PathBuf,

    // Max number of cached images
    #[arg(long, env = "MAX_CACHE_SIZE", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub max_cache_size: u64,

    // Backend request timeout in seconds
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,

    // Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn backend_url(&self) -> String {
        let url = self.backend_url.trim().trim_end_matches('/');
        // add http:// if not present
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn capacity(&self) -> usize {
        usize::try_from(self.max_cache_size).unwrap_or(usize::MAX)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
