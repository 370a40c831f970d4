//! `hearth status` — show configuration and backend reachability.

use hearth_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    println!("Hearth v{}", env!("CARGO_PKG_VERSION"));
    println!("  backend:        {}", config.backend.base_url);
    println!("  default model:  {}", config.default_model);
    println!("  max iterations: {}", config.max_iterations);
    println!(
        "  gateway:        {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("  store:          {}", config.store.path);

    let url = format!("{}/api/version", config.backend.base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            let version = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["version"].as_str().map(String::from))
                .unwrap_or_else(|| "unknown".into());
            println!("  ollama:         reachable (v{version})");
        }
        Ok(response) => {
            println!("  ollama:         unexpected status {}", response.status());
        }
        Err(e) => {
            println!("  ollama:         unreachable ({e})");
        }
    }

    Ok(())
}
