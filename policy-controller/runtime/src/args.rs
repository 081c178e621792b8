use crate::{
    core::{memory::MemoryDirectory, store::ConfigStore},
    reconcile::Reconciler,
    resolver::{ClusterInfo, Resolver},
    resources, Admin, Backoff, CertBinder, Compiler, FsConfigStore, MemoryConfigStore, Metrics,
    ProxyRegistry, Publisher, Scheduler, SelfSignedAuthority,
};
use anyhow::{anyhow, bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

const ROOT_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Parser)]
#[clap(name = "policy", about = "Compiles and publishes mesh proxy configuration")]
pub struct Args {
    #[clap(
        long,
        default_value = "mesh=info,warn",
        env = "MESH_POLICY_CONTROLLER_LOG"
    )]
    log_level: String,

    #[clap(long, default_value = "plain")]
    log_format: LogFormat,

    #[clap(long, default_value = "0.0.0.0:9990")]
    admin_addr: SocketAddr,

    /// A JSON document describing the mesh's resources.
    ///
    /// The document is reloaded on SIGHUP.
    #[clap(long, env = "MESH_POLICY_CONTROLLER_RESOURCES")]
    resources: PathBuf,

    /// The directory holding published namespaces.
    ///
    /// When unset, configurations are only kept in memory.
    #[clap(long, env = "MESH_POLICY_CONTROLLER_CONFIG_STORE")]
    config_store_root: Option<PathBuf>,

    #[clap(long, default_value = "base/sidecar")]
    base_namespace: String,

    #[clap(long, default_value = "sidecars")]
    sidecar_namespace_prefix: String,

    #[clap(long, default_value = "cluster.local")]
    trust_domain: String,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    #[clap(long, default_value = "24h")]
    cert_validity: Humane,

    #[clap(long, default_value = "1s")]
    retry_min_backoff: Humane,

    #[clap(long, default_value = "30s")]
    retry_max_backoff: Humane,

    #[clap(long, default_value = "60s")]
    resync_period: Humane,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// A duration written with an `ms`, `s`, `m` or `h` suffix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Humane(Duration);

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            admin_addr,
            resources,
            config_store_root,
            base_namespace,
            sidecar_namespace_prefix,
            trust_domain,
            cluster_domain,
            cert_validity: Humane(cert_validity),
            retry_min_backoff: Humane(retry_min_backoff),
            retry_max_backoff: Humane(retry_max_backoff),
            resync_period: Humane(resync_period),
        } = self;

        log_format.try_init(&log_level)?;

        for (flag, d) in [
            ("--cert-validity", cert_validity),
            ("--retry-min-backoff", retry_min_backoff),
            ("--resync-period", resync_period),
        ] {
            if d.is_zero() {
                bail!("{flag} must not be zero");
            }
        }

        let directory = Arc::new(MemoryDirectory::from_document(
            resources::load(&resources).await?,
        ));
        info!(path = %resources.display(), "Loaded resources");

        let resolver = Resolver::new(
            directory.clone(),
            Arc::new(ClusterInfo {
                cluster_domain,
                trust_domain: trust_domain.clone(),
            }),
        );

        let mut prom = <Registry>::default();
        let metrics = Metrics::register(&mut prom);

        let ca = SelfSignedAuthority::generate(
            &format!("root.{trust_domain}"),
            ROOT_VALIDITY.max(cert_validity),
            cert_validity,
        )?;
        let certs = CertBinder::new(Arc::new(ca), cert_validity, trust_domain, metrics.clone());

        let store: Arc<dyn ConfigStore> = match config_store_root {
            Some(root) => {
                info!(root = %root.display(), "Publishing to the filesystem");
                Arc::new(FsConfigStore::new(root))
            }
            None => {
                tracing::warn!("No config store root set, configurations are kept in memory");
                Arc::new(MemoryConfigStore::default())
            }
        };
        let publisher = Publisher::new(
            store,
            base_namespace,
            sidecar_namespace_prefix,
            metrics.clone(),
        );

        let registry = Arc::new(ProxyRegistry::default());
        let compiler = Compiler::new(
            directory.clone(),
            resolver,
            registry.clone(),
            certs,
            publisher,
            metrics.clone(),
        );
        let backoff = Backoff::new(retry_min_backoff, retry_max_backoff);
        let scheduler = Scheduler::new(compiler, backoff);

        let (ready_tx, ready_rx) = watch::channel(false);
        let reconciler = Reconciler::new(
            directory.clone(),
            registry,
            scheduler,
            metrics,
            resync_period,
            ready_tx,
        );
        tokio::spawn(reconciler.run().instrument(info_span!("reconcile")));

        tokio::spawn(
            resources::reload_on_hangup(resources, directory).instrument(info_span!("resources")),
        );

        let admin = Admin::new(ready_rx, Arc::new(prom));
        let listener = TcpListener::bind(admin_addr).await?;
        tokio::spawn(admin.serve(listener).instrument(info_span!("admin")));

        // Block the main thread on the shutdown signal.
        if tokio::signal::ctrl_c().await.is_err() {
            bail!("Aborted");
        }
        info!("Shutting down");
        Ok(())
    }
}

// === impl LogFormat ===

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => bail!("invalid log format: {s}"),
        }
    }
}

impl LogFormat {
    fn try_init(self, filter: &str) -> Result<()> {
        let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::try_new(filter)?);
        match self {
            Self::Plain => builder.try_init(),
            Self::Json => builder.json().try_init(),
        }
        .map_err(|e| anyhow!(e))
    }
}

// === impl Humane ===

impl std::str::FromStr for Humane {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow!("duration requires a unit: {s}"))?;
        let (n, unit) = s.split_at(split);
        let n = n
            .parse::<u64>()
            .map_err(|_| anyhow!("invalid duration: {s}"))?;
        let d = match unit {
            "ms" => Duration::from_millis(n),
            "s" => Duration::from_secs(n),
            "m" => Duration::from_secs(n.saturating_mul(60)),
            "h" => Duration::from_secs(n.saturating_mul(60 * 60)),
            _ => bail!("invalid duration unit: {s}"),
        };
        Ok(Self(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_humane_durations() {
        for (s, d) in [
            ("250ms", Duration::from_millis(250)),
            ("30s", Duration::from_secs(30)),
            ("5m", Duration::from_secs(300)),
            ("24h", Duration::from_secs(86_400)),
        ] {
            assert_eq!(s.parse::<Humane>().unwrap(), Humane(d), "{s}");
        }
        for s in ["", "24", "h", "1.5h", "3d", "-1s"] {
            assert!(s.parse::<Humane>().is_err(), "{s}");
        }
    }

    #[test]
    fn parses_defaults() {
        let args = Args::try_parse_from(["policy", "--resources", "/etc/mesh/resources.json"])
            .expect("defaults must parse");
        assert_eq!(args.log_format, LogFormat::Plain);
        assert_eq!(args.admin_addr, "0.0.0.0:9990".parse().unwrap());
        assert_eq!(args.config_store_root, None);
        assert_eq!(args.base_namespace, "base/sidecar");
        assert_eq!(args.sidecar_namespace_prefix, "sidecars");
        assert_eq!(args.cert_validity, Humane(Duration::from_secs(86_400)));
        assert_eq!(args.resync_period, Humane(Duration::from_secs(60)));
    }

    #[test]
    fn rejects_unknown_log_formats() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
