//! Dropping repeated file ids with the expiring key index

use fdfs_shared::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("=== fdfs-shared File Id Dedup Example ===\n");

    let scheduler = TokioScheduler::current()?;
    let config = ServiceConfig::default().index(
        KeyIndexConfig::default()
            .entry_ttl(Duration::from_secs(2))
            .sweep_interval(Duration::from_millis(500)),
    );
    let ctx = ServiceContext::new(config, &scheduler)?;

    let file_id = "group1/M00/00/00/wKgAA1xyz.jpg";

    println!("First upload notice: claimed = {}", ctx.claim_file_id(file_id)?);
    println!("Repeated notice:     claimed = {}", ctx.claim_file_id(file_id)?);

    println!("\nWaiting for the entry to expire...");
    tokio::time::sleep(Duration::from_secs(3)).await;

    println!("After expiry:        claimed = {}", ctx.claim_file_id(file_id)?);
    println!("\nIndex stats: {:?}", ctx.stats().index);

    ctx.shutdown();
    Ok(())
}
