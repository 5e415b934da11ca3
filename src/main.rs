//! datagate - ticket authenticated data registration gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use datagate::{
    auth::{CredentialBroker, SessionCodec},
    config::Args,
    db::{redact_uri, MongoClient, MongoFileRegistry, MongoMetadataStore, UnavailableStore},
    ingest::{FileRegistry, IngestionPipeline, MetadataStore},
    krb5::KinitConnector,
    logging, server, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, &args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  datagate");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("krb5.conf: {}", args.krb5.krb5_conf.display());
    info!("Realm: {}", args.krb5.realm.as_deref().unwrap_or("<default_realm>"));
    info!("Ticket dir: {}", args.krb5.ticket_dir.display());
    info!("MongoDB: {}", redact_uri(&args.mongodb_uri));
    info!(
        "Records: {}.{}",
        args.mongodb_db, args.mongodb_collection
    );
    info!("======================================");

    let schema = match args.schema() {
        Ok(s) => s,
        Err(e) => {
            error!("Schema error: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        mandatory = ?schema.mandatory(),
        adjustable = ?schema.adjustable(),
        "Attribute schema loaded"
    );

    // MongoDB problems never stop the gateway; ingestion fails per request instead
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            match client.ping().await {
                Ok(()) => info!("MongoDB connected successfully"),
                Err(e) => warn!("MongoDB not reachable yet, continuing: {}", e),
            }
            Some(client)
        }
        Err(e) => {
            warn!("MongoDB client unavailable, ingestion disabled: {}", e);
            None
        }
    };

    let (registry, store): (Arc<dyn FileRegistry>, Arc<dyn MetadataStore>) = match &mongo {
        Some(client) => {
            let registry = MongoFileRegistry::new(client);
            if let Err(e) = registry.ensure_indexes().await {
                warn!("Failed to create registry indexes: {}", e);
            }
            let store: Arc<dyn MetadataStore> = Arc::new(MongoMetadataStore::new(client.clone()));
            (Arc::new(registry) as Arc<dyn FileRegistry>, store)
        }
        None => {
            let unavailable = Arc::new(UnavailableStore::new("no MongoDB client"));
            (
                unavailable.clone() as Arc<dyn FileRegistry>,
                unavailable as Arc<dyn MetadataStore>,
            )
        }
    };

    let pipeline = IngestionPipeline::new(Arc::new(schema), registry, store, args.store_target());

    let broker = CredentialBroker::new(
        args.broker_config(),
        Arc::new(KinitConnector::new(args.krb5.kinit_path.clone())),
    );

    let session = SessionCodec::new(args.session_secret.as_deref())
        .with_max_age(args.session_max_age)
        .with_secure(args.secure_cookies);

    let state = Arc::new(AppState::new(args, session, broker, pipeline, mongo));

    server::run(state).await?;

    Ok(())
}
