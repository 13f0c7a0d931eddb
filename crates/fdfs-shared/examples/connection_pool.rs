//! Connection pool example against a local echo server

use fdfs_shared::prelude::*;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("=== fdfs-shared Connection Pool Example ===\n");

    // Stand-in for a storage server
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let storage = Destination::from(listener.local_addr()?);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || {
                let mut stream = stream;
                let mut buf = [0u8; 64];
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 || stream.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            });
        }
    });

    let pool = ConnectionPool::new(ConnectionPoolConfig::with_max_per_entry(2))?;

    println!("Acquiring connection to {}...", storage);
    let mut conn = pool.acquire(&storage)?;
    conn.write_all(b"hello")?;
    let mut reply = [0u8; 5];
    conn.read_exact(&mut reply)?;
    println!("  Echoed: {}", String::from_utf8_lossy(&reply));
    let id = conn.id();
    pool.release(conn, false)?;

    println!("\nAcquiring again (should reuse)...");
    let first = pool.acquire(&storage)?;
    println!("  Reused: {}", first.id() == id);

    println!("\nHitting the per-server limit...");
    let second = pool.acquire(&storage)?;
    match pool.acquire(&storage) {
        Err(e @ PoolError::CapacityExceeded { .. }) => println!("  Rejected: {}", e),
        other => println!("  Unexpected: {:?}", other.map(|c| c.id())),
    }

    // A broken connection is closed rather than pooled
    pool.release(first, true)?;
    pool.release(second, false)?;

    println!("\nPool stats: {:?}", pool.stats());
    println!("Idle connections: {}", pool.connection_count());

    Ok(())
}
