use anyhow::Context;
use attrsearch_server::config::{BackendKind, ServerConfig};
use attrsearch_server::{app, AppState};
use attrsearch_storage::{InMemoryBackend, SearchBackend};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = ServerConfig::from_env()?;
    let (users, shops) = match cfg.backend {
        BackendKind::Memory => (
            memory_backend(&cfg.users_index, cfg.users_seed.as_deref())?,
            memory_backend(&cfg.shops_index, cfg.shops_seed.as_deref())?,
        ),
        BackendKind::Elasticsearch => elastic_backends(&cfg).await?,
    };
    info!(
        backend = ?cfg.backend,
        users = users.index(),
        shops = shops.index(),
        timeout_ms = cfg.search_timeout.as_millis() as u64,
        "search backends ready"
    );

    let app = app(AppState::new(users, shops, cfg.search_timeout));
    let http_addr = cfg.http_addr;
    match &cfg.tls {
        Some(tls) => {
            let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .with_context(|| format!("loading TLS material from {}", tls.cert.display()))?;
            info!(%http_addr, "HTTPS listening");
            axum_server::bind_rustls(http_addr, config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%http_addr, "HTTP listening");
            axum_server::bind(http_addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}

fn memory_backend(index: &str, seed: Option<&Path>) -> anyhow::Result<Arc<dyn SearchBackend>> {
    let backend = InMemoryBackend::new(index);
    if let Some(path) = seed {
        let n = backend
            .load_file(path)
            .with_context(|| format!("seeding {index} from {}", path.display()))?;
        info!(index, documents = n, "seed loaded");
    }
    Ok(Arc::new(backend))
}

#[cfg(feature = "elasticsearch")]
async fn elastic_backends(
    cfg: &ServerConfig,
) -> anyhow::Result<(Arc<dyn SearchBackend>, Arc<dyn SearchBackend>)> {
    use attrsearch_storage::elastic::repair_shop_index_body;
    use attrsearch_storage::{ElasticBackend, ElasticConfig};

    let timeout_ms = cfg.search_timeout.as_millis() as u64;
    let mut users = ElasticConfig::new(&cfg.elasticsearch_url, &cfg.users_index);
    users.request_timeout_ms = timeout_ms;
    let mut shops = ElasticConfig::new(&cfg.elasticsearch_url, &cfg.shops_index);
    shops.request_timeout_ms = timeout_ms;
    shops.index_body = Some(repair_shop_index_body());

    let users = ElasticBackend::new(users)?;
    let shops = ElasticBackend::new(shops)?;
    // the shop mapping has to exist before the first geo query
    shops
        .create_index()
        .await
        .with_context(|| format!("creating index {}", cfg.shops_index))?;
    Ok((Arc::new(users), Arc::new(shops)))
}

#[cfg(not(feature = "elasticsearch"))]
async fn elastic_backends(
    _cfg: &ServerConfig,
) -> anyhow::Result<(Arc<dyn SearchBackend>, Arc<dyn SearchBackend>)> {
    anyhow::bail!("SEARCH_BACKEND=elasticsearch requires the `elasticsearch` feature")
}
