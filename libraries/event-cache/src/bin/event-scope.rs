#[cfg(not(feature = "http"))]
fn main() {
    eprintln!("event-scope requires the 'http' feature to be enabled");
    eprintln!("Please run with: cargo run --bin event-scope --features http");
    std::process::exit(1);
}

#[cfg(feature = "http")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use anyhow::{Context, bail};
    use event_cache::http::HttpTransport;
    use event_cache::{
        ClientConfig, EventCache, EventFilter, Partition, PartitionKey, compile, project,
    };

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <mine|active|past|favorites|detail ID> [--filter JSON] [--search TEXT]",
            args[0]
        );
        eprintln!("\nExample: {} active --filter '{{\"city\": [\"Kazan\"]}}' --search rust", args[0]);
        std::process::exit(1);
    }

    let mut rest = args[1..].iter();
    let partition = match rest.next().map(String::as_str) {
        Some("mine") => Partition::Mine,
        Some("active") => Partition::Active,
        Some("past") => Partition::Past,
        Some("favorites") => Partition::Favorites,
        Some("detail") => {
            let id = rest.next().context("detail needs an event id")?;
            Partition::Detail(id.as_str().into())
        }
        Some(other) => bail!("unknown partition `{other}`"),
        None => bail!("missing partition"),
    };

    let mut filter = EventFilter::default();
    let mut search = String::new();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--filter" => {
                let raw = rest.next().context("--filter needs a JSON object")?;
                filter = serde_json::from_str(raw).context("parsing --filter")?;
            }
            "--search" => {
                search = rest.next().context("--search needs a value")?.clone();
            }
            other => bail!("unknown argument `{other}`"),
        }
    }

    let config = ClientConfig::from_env();
    if config.api_url.is_empty() {
        bail!("EVENTS_API_URL is not set");
    }

    let compiled = compile(&filter);
    let key = PartitionKey::filtered(partition, &compiled);
    let cache = EventCache::new(HttpTransport::new(&config), &config);

    println!("EventScope - events API inspector");
    println!("=================================");
    println!("Partition: {key}");
    println!("Request:   {}{}", config.api_url, key.path());
    println!();

    let records = cache.resolve(&key).await?;
    let shown = project(&records, &compiled.residual, &search);

    println!("Fetched {} event(s), showing {}", records.len(), shown.len());
    println!();
    for record in &shown {
        let status = record.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        let capacity = record
            .capacity
            .filter(|c| *c > 0)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "∞".to_string());
        println!("  [{}] {}", record.id, record.name);
        println!(
            "    status: {status}, participants: {}/{capacity}, paid: {}, joined: {}, liked: {}",
            record.participants(),
            record.is_paid(),
            record.participating,
            record.favorite,
        );
    }

    Ok(())
}
