//! `switchyard config` — Configuration inspection.

use switchyard_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed and validated");

    let mut warnings = Vec::new();
    if config.agent.tool_timeout_ms >= config.agent.total_timeout_ms {
        warnings.push("agent.tool_timeout_ms is not below agent.total_timeout_ms; a slow tool can eat the whole turn");
    }
    if config.agent.retry_backoff_ms > config.agent.max_retry_backoff_ms {
        warnings.push("agent.retry_backoff_ms exceeds agent.max_retry_backoff_ms");
    }
    if config.context.budget.system_prompt == 0 {
        warnings.push("context.budget.system_prompt is 0; the persona prompt will be dropped");
    }
    for w in &warnings {
        println!("   ⚠️  {w}");
    }

    println!();
    println!("   Max iterations:  {}", config.agent.max_iterations);
    println!(
        "   Timeouts:        tool {}ms, total {}ms",
        config.agent.tool_timeout_ms, config.agent.total_timeout_ms
    );
    println!("   Context budget:  {} tokens", config.context.budget.total());
    println!("   Stale after:     {} min", config.session.stale_after_minutes);
    println!("   Default locale:  {}", config.handler.default_locale);
    println!("   Channel prompts: {}", config.persona.channel_prompts.len());

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_toml());
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
