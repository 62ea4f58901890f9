use std::future::Future;

use crate::app::{AppContext, FeedmillError, Result};
use crate::domain::FeedScope;
use crate::fetcher::FetchOutcome;
use crate::store::{ItemQuery, Store};
use crate::sweep::{SweepConfig, Sweeper};

pub async fn update_feeds(
    ctx: &AppContext,
    user: Option<String>,
    feed: Option<i64>,
) -> Result<()> {
    let scope = FeedScope {
        user_id: user,
        feed_id: feed,
    };

    let report = ctx.updater.update_all(&scope).await?;

    if report.attempted() == 0 {
        println!("No feeds to update");
        return Ok(());
    }

    for merged in &report.merged {
        if merged.inserted > 0 {
            if let Ok(Some(feed)) = ctx.store.get_feed(merged.feed_id) {
                println!("  {} new items from {}", merged.inserted, feed.display_title());
            }
        }
    }

    for failure in &report.failures {
        let flag = if failure.needs_attention { " (needs attention)" } else { "" };
        eprintln!("  Error updating {}: {}{}", failure.url, failure.error, flag);
    }

    println!(
        "Update complete: {} new items, {} not modified, {} errors",
        report.inserted(),
        report.not_modified.len(),
        report.failures.len()
    );
    Ok(())
}

pub async fn fetch_feed(ctx: &AppContext, feed_id: i64) -> Result<()> {
    match ctx.updater.fetch_one(feed_id).await? {
        FetchOutcome::NotModified => println!("Feed not modified"),
        FetchOutcome::Fetched(fetched) => {
            if let Some(title) = &fetched.title {
                println!("Feed title: {}", title);
            }
            if let Some(favicon) = &fetched.favicon_link {
                println!("Favicon: {}", favicon);
            }
            for item in &fetched.items {
                println!("  {}", item.display_title());
            }
            println!("Fetched {} items", fetched.items.len());
        }
    }
    Ok(())
}

pub async fn subscribe(
    ctx: &AppContext,
    user: &str,
    url: &str,
    folder: Option<i64>,
) -> Result<()> {
    let feed = ctx.feeds.subscribe(user, url, folder).await?;
    let unread = ctx.store.unread_count(feed.id)?;

    println!("Subscribed to {} (id {})", feed.display_title(), feed.id);
    println!("Fetched {} items", unread);
    Ok(())
}

pub fn create_folder(ctx: &AppContext, user: &str, name: &str, parent: Option<i64>) -> Result<()> {
    let folder = ctx.folders.create(user, name, parent)?;
    println!("Created folder {} (id {})", folder.name, folder.id);
    Ok(())
}

pub fn list_feeds(ctx: &AppContext, user: &str) -> Result<()> {
    let feeds = ctx.feeds.list(user)?;

    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        let unread = ctx.store.unread_count(feed.id)?;
        let attention = if feed.needs_attention { " [!]" } else { "" };
        println!(
            "{:>4} {} ({} unread){}\n     {}",
            feed.id,
            feed.display_title(),
            unread,
            attention,
            feed.url
        );
        if let Some(error) = &feed.last_error {
            println!("     last error: {}", error);
        }
    }

    Ok(())
}

pub fn list_items(ctx: &AppContext, query: &ItemQuery) -> Result<()> {
    let items = ctx.items.list(query)?;

    if items.is_empty() {
        println!("No items");
        return Ok(());
    }

    for item in items {
        let read_marker = if item.is_unread() { "●" } else { " " };
        let star = if item.is_starred() { "★" } else { " " };

        let date = item
            .pub_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "          ".to_string());

        println!("{}{} {} {}", read_marker, star, date, item.display_title());
    }

    Ok(())
}

pub async fn run_daemon<F>(
    ctx: &AppContext,
    interval: &str,
    no_initial_update: bool,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let interval_secs = SweepConfig::parse_interval(interval).map_err(FeedmillError::Other)?;
    let config = SweepConfig {
        interval_secs,
        update_on_start: !no_initial_update,
    };

    println!(
        "Updating every {} (Ctrl-C to stop)",
        SweepConfig::format_interval(interval_secs)
    );

    Sweeper::new(ctx.updater.clone(), config).run(shutdown).await;
    Ok(())
}
