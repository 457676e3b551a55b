//! `init`: create a configuration file and database.

use std::io::Write;
use std::path::Path;

use crate::config::Configuration;
use crate::{Database, Result};

const TEMPLATE_CONFIG: &str = r#"# feedhook configuration

[global]
# SQLite database, relative to this file.
database = "{database}"
# log_file = "feeds.log"
log_level = "info"
# Seconds before a running hook is killed.
hook_timeout_secs = 300
# Run for every new item of every feed.
# on_new_item = "notify-send {feed_title} {title}"
# Run once per update when any feed received new items.
# on_update = "./rebuild.sh {*feeds}"

[fetch]
connect_timeout_secs = 10
total_timeout_secs = 30

# [feeds.example]
# url = "https://example.com/feed.xml"
# title = "Example"
# update_interval = "1 hour"
# accept_bozo = false
# on_new_item = "echo {title} {link}"
# on_update = "echo {count} new items in {feed}"
"#;

/// Render the template configuration for a config file path.
///
/// The database is named after the configuration file.
pub fn template_config(config_path: &Path) -> String {
    let stem = config_path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("feeds");
    TEMPLATE_CONFIG.replace("{database}", &format!("{stem}.db"))
}

/// Create the configuration file and database unless they exist.
pub async fn init(config_path: &Path, out: &mut dyn Write) -> Result<()> {
    if config_path.exists() {
        writeln!(
            out,
            "Using existing configuration file '{}'...",
            config_path.display()
        )?;
    } else {
        writeln!(
            out,
            "Creating template configuration file '{}'...",
            config_path.display()
        )?;
        std::fs::write(config_path, template_config(config_path))?;
    }

    let configuration = Configuration::load(config_path)?;
    let db_file = configuration.database_file();

    if db_file.exists() {
        writeln!(
            out,
            "Using existing feed item database '{}'...",
            db_file.display()
        )?;
    } else {
        writeln!(out, "Creating feed item database '{}'...", db_file.display())?;
        let db = Database::create(&db_file).await?;
        db.close().await;
    }

    Ok(())
}
