mod cli;

use framevault::config;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use fv_core::config::Config;
use fv_core::media::Format;
use fv_store::{MediaQuery, MediaStore};
use serde::Serialize;
use std::future::Future;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "framevault=debug,fv_store=debug,fv_spec=debug,fv_core=debug".to_string()
        } else {
            "framevault=info,fv_store=info,fv_spec=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Spec { spec } => print_spec(&spec),
        Commands::Import { file, no_overwrite } => {
            with_store(cli.config.as_deref(), |store| async move {
                import_format(&store, &file, !no_overwrite).await
            })
        }
        Commands::Format { url } => with_store(cli.config.as_deref(), |store| async move {
            print_json(&store.retrieve_format(&url).await?)
        }),
        Commands::Stream { url, index } => {
            with_store(cli.config.as_deref(), |store| async move {
                print_json(&store.retrieve_stream(&url, index).await?)
            })
        }
        Commands::Media {
            url,
            stream,
            spec,
            offset,
            limit,
            metadata_only,
        } => {
            let mut query = MediaQuery::from(parse_spec(&spec)?).with_offset(offset);
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }
            if metadata_only {
                query = query.metadata_only();
            }
            with_store(cli.config.as_deref(), |store| async move {
                print_media(&store, &url, stream, &query).await
            })
        }
        Commands::List { start, limit } => {
            with_store(cli.config.as_deref(), |store| async move {
                list_content(&store, start, limit).await
            })
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("framevault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Open the configured store, run `f` against it and close it again.
fn with_store<F, Fut>(config_path: Option<&Path>, f: F) -> Result<()>
where
    F: FnOnce(MediaStore) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let (config, _) = config::load_config_or_default(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let store = MediaStore::open(&config.store, &config.pool, &config.ttl)
            .await
            .with_context(|| format!("Failed to open store at {:?}", config.store.path))?;
        let result = f(store.clone()).await;
        store.close().await?;
        result
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_spec(spec: &str) -> Result<fv_spec::MediaSpec> {
    fv_spec::parse(spec).with_context(|| format!("Invalid media spec: {:?}", spec))
}

fn print_spec(spec: &str) -> Result<()> {
    let parsed = parse_spec(spec)?;
    tracing::debug!("Resolved {:?} to {}", spec, parsed);
    println!("{}", serde_json::to_string(&parsed)?);
    Ok(())
}

async fn import_format(store: &MediaStore, file: &Path, overwrite: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read format document: {:?}", file))?;
    let mut format: Format = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse format document: {:?}", file))?;

    let writes = store.store_format(&mut format, overwrite).await?;

    #[derive(Serialize)]
    struct Imported<'a> {
        url: Option<&'a str>,
        writes: Vec<fv_store::KeyWrite>,
    }
    print_json(&Imported {
        url: format.url.as_ref().map(|u| u.as_str()),
        writes,
    })
}

async fn list_content(store: &MediaStore, start: usize, limit: Option<usize>) -> Result<()> {
    for url in store.list_content(start, limit).await? {
        println!("{}", url);
    }
    Ok(())
}

async fn print_media(
    store: &MediaStore,
    url: &str,
    stream: u32,
    query: &MediaQuery,
) -> Result<()> {
    let media = store.retrieve_media(url, stream, query).await?;

    // Payloads are not serialized; report their size instead.
    let mut out = Vec::with_capacity(media.len());
    for element in &media {
        let mut value = serde_json::to_value(element)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("payload_bytes".into(), element.payload_len().into());
        }
        out.push(value);
    }
    print_json(&out)
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration is valid with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  ! {}", warning);
        }
    }
    println!("  Store: {}", config.store.path.display());
    println!("  Prefix: {}", config.store.prefix);
    println!(
        "  Pool: {} connections (grow by {})",
        config.pool.max_size, config.pool.grow_batch
    );
    println!(
        "  TTL: metadata {}s, payload {}s, ephemeral {}s",
        config.ttl.metadata_secs, config.ttl.payload_secs, config.ttl.ephemeral_secs
    );

    Ok(())
}
