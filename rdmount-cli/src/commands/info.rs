//! Info command - account details and the most recent items.

use rdmount::remote::{client_from_config, RemoteItem};

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

const RECENT_ITEMS: usize = 5;

/// Run the info command.
pub fn run(options: &GlobalOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(options, false)?;
    runner.log_startup("info");
    let config = runner.config();
    config.require_token()?;
    let remote = client_from_config(config)?;

    let (user, mut items) = runner.block_on(async {
        let user = remote.user_info().await?;
        let items = remote.list_items().await?;
        Ok::<_, CliError>((user, items))
    })?;

    println!("Account");
    println!("  User:    {} <{}>", user.username, user.email);
    println!("  Type:    {}", user.account_type);
    if let Some(until) = user.premium_until {
        println!("  Premium: until {}", until.format("%Y-%m-%d"));
    }
    println!("  Points:  {}", user.points);
    println!();
    println!("Items: {}", items.len());

    items.sort_by(|a, b| b.added.cmp(&a.added));
    if !items.is_empty() {
        println!();
        println!("Most recent:");
        for item in items.iter().take(RECENT_ITEMS) {
            println!("  {}", describe(item));
        }
    }
    Ok(())
}

fn describe(item: &RemoteItem) -> String {
    let added = item
        .added
        .map(|a| a.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {:<15} {}  {}",
        added,
        item.status.as_str(),
        item.id,
        item.name
    )
}
