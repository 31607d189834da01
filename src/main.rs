// MoodTune server entrypoint
// Loads config from the environment and serves the API (plus the web UI
// bundle when one has been built into ui/dist).

use std::path::PathBuf;

use moodtune::config::AppConfig;
use moodtune::server;

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[server] {}", e);
            std::process::exit(1);
        }
    };

    let ui_dist = Some(PathBuf::from("ui/dist"));

    if let Err(e) = server::start_server(config, ui_dist).await {
        eprintln!("[server] {}", e);
        std::process::exit(1);
    }
}
