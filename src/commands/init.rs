use anyhow::Result;
use dealwatch::config::Config;
use std::path::Path;

/// Write a commented default configuration file
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let config = Config::default();
    let targets = config
        .monitor
        .targets
        .iter()
        .map(|t| format!("  {{ url = \"{}\", kind = \"listing\" }},", t.url))
        .collect::<Vec<_>>()
        .join("\n");

    let toml_content = format!(
        r#"# dealwatch configuration

[monitor]
# kind = "listing" (search results) or "product" (single item page)
targets = [
{targets}
]
poll_interval_secs = {poll}
interval_jitter_secs = {jitter}
# Active window in local time: [start_hour, end_hour)
start_hour = {start}
end_hour = {end}
# "first_eligible" or "all_eligible"
notify_mode = "first_eligible"
max_consecutive_failures = {failures}
enrich_from_detail = {enrich}

[fetch]
max_attempts = {attempts}
base_delay_ms = {base_delay}
throttle_delay_ms = {throttle_delay}
max_backoff_secs = {max_backoff}
min_request_delay_ms = {min_delay}
max_request_delay_ms = {max_delay}
timeout_secs = {timeout}

[filter]
max_price = {max_price}
min_discount = {min_discount}
require_discount = {require_discount}
require_availability = {require_availability}
# required_seller = "Venduto da Amazon"

[dedup]
path = "{dedup_path}"
retention_hours = {retention}

[notify]
# Secrets may also come from TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DEALWATCH_REF_TAG (or a .env file)
# bot_token = ""
# chat_id = ""
# affiliate_tag = ""
# template_image = "template.png"
compose_timeout_secs = {compose_timeout}

[logging]
level = "info"
format = "text"
"#,
        targets = targets,
        poll = config.monitor.poll_interval_secs,
        jitter = config.monitor.interval_jitter_secs,
        start = config.monitor.start_hour,
        end = config.monitor.end_hour,
        failures = config.monitor.max_consecutive_failures,
        enrich = config.monitor.enrich_from_detail,
        attempts = config.fetch.max_attempts,
        base_delay = config.fetch.base_delay_ms,
        throttle_delay = config.fetch.throttle_delay_ms,
        max_backoff = config.fetch.max_backoff_secs,
        min_delay = config.fetch.min_request_delay_ms,
        max_delay = config.fetch.max_request_delay_ms,
        timeout = config.fetch.timeout_secs,
        max_price = config.filter.max_price,
        min_discount = config.filter.min_discount,
        require_discount = config.filter.require_discount,
        require_availability = config.filter.require_availability,
        dedup_path = config.dedup.path.display(),
        retention = config.dedup.retention_hours,
        compose_timeout = config.notify.compose_timeout_secs,
    );

    // The generated file must load back
    Config::from_toml(&toml_content)?.validate()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml_content)?;
    println!("Created configuration file: {}", path.display());
    Ok(())
}
