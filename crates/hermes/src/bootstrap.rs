//! Building a running service from [`HermesConfig`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hermes_auth::{
    AuthSetupError, BasicAuthProvider, BearerConfig, BearerTokenProvider, MemoryCredentialStore, MemoryTicketStore,
    TicketProvider,
};
use hermes_config::{AuthSection, ConfigError, ConfigLoader, CorsSection, HermesConfig, ServerSection};
use hermes_pipeline::{BuildError, CorsPolicy, Pipeline, PipelineBuilder};
use hermes_server::{Server, ServerConfig, ServerError, ShutdownSignal, TrustedProxy};
use hermes_telemetry::TelemetryError;
use http::Method;
use thiserror::Error;

/// Startup failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration did not load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An auth provider could not be built.
    #[error(transparent)]
    Auth(#[from] AuthSetupError),

    /// Route registration or provider resolution failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Logging could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The transport failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Converts the `server` section into a transport configuration.
pub fn server_config(section: &ServerSection) -> Result<ServerConfig, ConfigError> {
    let trusted = section
        .trusted_proxies
        .iter()
        .map(|p| p.parse::<TrustedProxy>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::invalid_value("server.trusted_proxies", e.to_string()))?;

    Ok(ServerConfig::builder()
        .http_addr(section.http_addr.clone())
        .shutdown_timeout(Duration::from_secs(section.shutdown_timeout_secs))
        .idle_timeout(Duration::from_secs(section.idle_timeout_secs))
        .keep_alive(section.keep_alive)
        .max_connections(section.max_connections)
        .max_in_flight(section.max_in_flight)
        .max_content_length(section.max_content_length)
        .proxy_protocol(section.proxy_protocol)
        .proxy_header_timeout(Duration::from_secs(section.proxy_header_timeout_secs))
        .trusted_proxies(trusted)
        .build())
}

/// Converts the `cors` section into a policy, or `None` when disabled.
pub fn cors_policy(section: &CorsSection) -> Result<Option<CorsPolicy>, ConfigError> {
    if !section.enabled {
        return Ok(None);
    }

    let methods = section
        .allowed_methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.as_bytes())
                .map_err(|_| ConfigError::invalid_value("cors.allowed_methods", format!("invalid method `{m}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let policy = section
        .allowed_origins
        .iter()
        .fold(CorsPolicy::new(), |policy, origin| policy.allow_origin(origin.clone()))
        .allow_methods(methods)
        .allow_headers(section.allowed_headers.iter().cloned())
        .expose_headers(section.exposed_headers.iter().cloned())
        .allow_credentials(section.allow_credentials)
        .max_age(Duration::from_secs(section.max_age_secs));

    Ok(Some(policy))
}

fn seconds(field: &str, secs: u64) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::from_std(Duration::from_secs(secs))
        .map_err(|_| ConfigError::invalid_value(field, "out of range"))
}

/// Auth providers built from the `auth` section.
///
/// Handles are kept so the application can issue credentials: tokens from
/// a login route, tickets for clients that cannot send headers.
#[derive(Debug, Clone, Default)]
pub struct Providers {
    bearer: Option<Arc<BearerTokenProvider>>,
    basic: Option<(Arc<MemoryCredentialStore>, String)>,
    tickets: Option<Arc<MemoryTicketStore>>,
}

impl Providers {
    /// Builds the providers enabled in `section`.
    pub fn from_section(section: &AuthSection) -> Result<Self, BootstrapError> {
        let bearer = match &section.bearer {
            Some(bearer) => {
                let config = BearerConfig::new(bearer.issuer.clone(), bearer.secret.as_bytes().to_vec())
                    .with_access_ttl(seconds("auth.bearer.access_ttl_secs", bearer.access_ttl_secs)?)
                    .with_refresh_ttl(seconds("auth.bearer.refresh_ttl_secs", bearer.refresh_ttl_secs)?)
                    .with_leeway(seconds("auth.bearer.leeway_secs", bearer.leeway_secs)?);
                Some(Arc::new(BearerTokenProvider::new(config)?))
            }
            None => None,
        };

        let basic = match &section.basic {
            Some(basic) => {
                let store = Arc::new(MemoryCredentialStore::new());
                for user in &basic.users {
                    store
                        .insert(user.username.clone(), &user.password, user.scopes.iter().cloned())
                        .map_err(|e| ConfigError::invalid_value("auth.basic.users", e.to_string()))?;
                }
                Some((store, basic.realm.clone()))
            }
            None => None,
        };

        let tickets = section
            .ticket
            .enabled
            .then(|| Arc::new(MemoryTicketStore::new(Duration::from_secs(section.ticket.ttl_secs))));

        Ok(Self { bearer, basic, tickets })
    }

    /// The bearer provider, if configured.
    pub fn bearer(&self) -> Option<&Arc<BearerTokenProvider>> {
        self.bearer.as_ref()
    }

    /// The basic auth credential store, if configured.
    pub fn credentials(&self) -> Option<&Arc<MemoryCredentialStore>> {
        self.basic.as_ref().map(|(store, _)| store)
    }

    /// The ticket store, if tickets are enabled.
    pub fn tickets(&self) -> Option<&Arc<MemoryTicketStore>> {
        self.tickets.as_ref()
    }

    /// Registers every provider with `builder`: bearer, then basic, then
    /// ticket.
    pub fn register(&self, builder: &mut PipelineBuilder) -> Result<(), BuildError> {
        if let Some(bearer) = &self.bearer {
            builder.provider_shared(Arc::clone(bearer) as _)?;
        }
        if let Some((store, realm)) = &self.basic {
            builder.provider(BasicAuthProvider::new(Arc::clone(store), realm.clone()))?;
        }
        if let Some(store) = &self.tickets {
            builder.provider(TicketProvider::new(Arc::clone(store)))?;
        }
        Ok(())
    }
}

/// A configured service, ready to have routes registered and be served.
///
/// # Example
///
/// ```no_run
/// use hermes::Hermes;
/// use hermes::prelude::*;
///
/// # async fn run() -> Result<(), hermes::BootstrapError> {
/// let app = Hermes::load(Some("hermes.toml"))?;
/// app.init_logging()?;
///
/// let mut builder = app.pipeline_builder()?;
/// builder.register(Route::get("/healthz", handler_fn(|_request| {
///     Box::pin(async { Ok::<_, PipelineError>(Response::no_content()) })
/// })).public())?;
///
/// app.serve(builder.build()?, ShutdownSignal::with_os_signals()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Hermes {
    config: HermesConfig,
    providers: Providers,
}

impl Hermes {
    /// Validates `config` and builds its auth providers.
    pub fn from_config(config: HermesConfig) -> Result<Self, BootstrapError> {
        config.validate()?;
        let providers = Providers::from_section(&config.auth)?;
        Ok(Self { config, providers })
    }

    /// Loads the production preset, then `path` if it exists, then `.env`
    /// and `HERMES__*` variables.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, BootstrapError> {
        let mut loader = ConfigLoader::new().with_production();
        if let Some(path) = path {
            loader = loader.with_optional_file(path)?;
        }
        let config = loader
            .with_dotenv()?
            .with_env_prefix(hermes_config::DEFAULT_ENV_PREFIX)
            .load()?;
        Self::from_config(config)
    }

    /// The validated configuration.
    pub fn config(&self) -> &HermesConfig {
        &self.config
    }

    /// The configured auth providers.
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Installs the global subscriber from the `logging` section.
    pub fn init_logging(&self) -> Result<(), BootstrapError> {
        hermes_telemetry::init_logging(&self.config.logging)?;
        hermes_telemetry::describe_metrics();
        Ok(())
    }

    /// A pipeline builder with the configured CORS policy and providers.
    pub fn pipeline_builder(&self) -> Result<PipelineBuilder, BootstrapError> {
        let mut builder = PipelineBuilder::new();
        if let Some(policy) = cors_policy(&self.config.cors)? {
            builder = builder.cors(policy);
        }
        self.providers.register(&mut builder)?;
        Ok(builder)
    }

    /// A server running `pipeline` with the configured transport.
    pub fn server(&self, pipeline: Pipeline) -> Result<Server, BootstrapError> {
        Ok(Server::new(server_config(&self.config.server)?, pipeline))
    }

    /// Serves `pipeline` until `shutdown` triggers.
    ///
    /// While running, spent and expired tickets are purged once per ticket
    /// lifetime.
    pub async fn serve(self, pipeline: Pipeline, shutdown: ShutdownSignal) -> Result<(), BootstrapError> {
        let server = self.server(pipeline)?;

        if let Some(store) = self.providers.tickets() {
            let period = Duration::from_secs(self.config.auth.ticket.ttl_secs.max(1));
            tokio::spawn(sweep_tickets(Arc::clone(store), period, shutdown.clone()));
        }

        server.run_with_shutdown(shutdown).await?;
        Ok(())
    }
}

async fn sweep_tickets(store: Arc<MemoryTicketStore>, period: Duration, shutdown: ShutdownSignal) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = store.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "purged tickets");
                }
            }
            () = shutdown.recv() => break,
        }
    }
}
