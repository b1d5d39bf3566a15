use std::time::{Duration, Instant};

use gns_resolver::{
    DnsAuthority, Record, RecordType, Resolver, SigningKey, Testnet, Timestamp, ZoneKey,
};

use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Resolve a name in a small in-memory world:
///
/// `www.sub` is reached through a PKEY delegation, `www.legacy` through GNS2DNS,
/// and the root zone's key can be used as a top level label.
struct Cli {
    /// Name to resolve, relative to the root zone
    #[arg(default_value = "www.sub")]
    name: String,
    /// Record type, as a mnemonic or a number
    #[arg(short, long, default_value = "A")]
    record_type: RecordType,
    /// Maximum number of delegations to follow
    #[arg(short, long, default_value_t = 4)]
    depth: u32,
    /// Show resolver traces
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .init();

    let testnet = Testnet::new();
    let root = SigningKey::from_bytes(&rand::random());

    if let Err(error) = populate(&testnet, &root) {
        println!("Error: {}", error);
        return;
    }

    let resolver = match Resolver::builder(testnet.namecache(), testnet.dht())
        .dns_bridge(testnet.dns_bridge())
        .build()
    {
        Ok(resolver) => resolver,
        Err(error) => {
            println!("Error: {}", error);
            return;
        }
    };

    println!("\nRoot zone: {}", ZoneKey::from(&root));
    println!(
        "Looking up {} {:?} with depth {} ...\n",
        cli.name, cli.record_type, cli.depth
    );

    let start = Instant::now();

    let result = resolver
        .lookup(
            ZoneKey::from(&root),
            cli.record_type,
            &cli.name,
            Default::default(),
            cli.depth,
        )
        .map(|pending| pending.wait());

    match result {
        Ok(Some(records)) if records.is_empty() => println!("No records found"),
        Ok(Some(records)) => {
            for record in records {
                println!(
                    "{:?} {:?} flags={:?}",
                    record.record_type, record.data, record.flags
                );
            }
        }
        Ok(None) => println!("Lookup was cancelled"),
        Err(error) => println!("Error: {}", error),
    }

    println!(
        "\nResolved in {:?} seconds",
        start.elapsed().as_secs_f32()
    );

    resolver.shutdown();
}

fn populate(testnet: &Testnet, root: &SigningKey) -> Result<(), Box<dyn std::error::Error>> {
    let sub = SigningKey::from_bytes(&rand::random());
    let expiration = Timestamp::now() + Duration::from_secs(3600);

    testnet.publish(
        root,
        "sub",
        &[Record::delegation(&ZoneKey::from(&sub), expiration)],
        expiration,
    )?;
    testnet.publish(
        root,
        "legacy",
        &[Record::new(
            RecordType::GNS2DNS,
            DnsAuthority::encode("example.com", "192.0.2.53"),
            expiration,
        )],
        expiration,
    )?;
    testnet.publish(
        root,
        "@",
        &[Record::new(RecordType::TXT, &b"root zone apex"[..], expiration)],
        expiration,
    )?;

    testnet.publish(
        &sub,
        "www",
        &[
            Record::new(RecordType::A, vec![192, 0, 2, 1], expiration),
            Record::new(RecordType::TXT, &b"hello from sub"[..], expiration),
        ],
        expiration,
    )?;

    testnet.set_dns(
        "www.example.com",
        RecordType::A,
        vec![Record::new(RecordType::A, vec![93, 184, 215, 14], expiration)],
    );

    Ok(())
}
