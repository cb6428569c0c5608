//! Main application structure and lifecycle management

use crate::{api::ApiServer, database::Database, storage::SqliteStore};
use anyhow::{anyhow, Context, Result};
use config::Config;
use payment::{forwarder_domain, CheckoutService, FeeCalculator, ForwarderVerifier};
use relay_client::{RelayerApi, RelayerClient, RelaySubmitter, SubmitterSettings};
use std::{future::Future, sync::Arc};
use tracing::info;
use webhook::{MerchantNotifier, WebhookReconciler};

/// Services shared by every request handler
pub struct AppState {
    pub config: Config,
    pub database: Database,
    pub store: Arc<SqliteStore>,
    pub calculator: Arc<FeeCalculator>,
    pub checkout: CheckoutService,
    pub verifier: ForwarderVerifier,
    pub submitter: RelaySubmitter,
    pub reconciler: WebhookReconciler,
}

impl AppState {
    /// Wire services over a migrated database, talking to the configured relayer
    pub fn new(config: Config, database: Database) -> Result<Self> {
        let relayer =
            RelayerClient::new(&config.relayer).context("Failed to create relayer client")?;
        Self::with_relayer(config, database, Arc::new(relayer))
    }

    /// Wire services with an explicit relayer implementation
    pub fn with_relayer(
        config: Config,
        database: Database,
        relayer: Arc<dyn RelayerApi>,
    ) -> Result<Self> {
        let schedule = config
            .to_fee_schedule()
            .map_err(|e| anyhow!(e))
            .context("Invalid fee schedule")?;
        info!(
            version = schedule.version,
            effective_at = %schedule.effective_at,
            tokens = schedule.tokens().count(),
            "Fee schedule loaded"
        );

        let store = Arc::new(SqliteStore::new(database.pool().clone()));
        let calculator = Arc::new(FeeCalculator::new(schedule));

        let checkout = CheckoutService::new(
            store.clone(),
            store.clone(),
            calculator.clone(),
            config.checkout.public_base_url.clone(),
            config.checkout.intent_ttl_seconds,
        );

        let verifier = ForwarderVerifier::new(
            forwarder_domain(
                &config.contracts.forwarder_name,
                &config.contracts.forwarder_version,
                config.network.chain_id,
                config.contracts.forwarder_address,
            ),
            config.contracts.payment_gateway_address,
        );

        let submitter = RelaySubmitter::new(
            relayer,
            store.clone(),
            SubmitterSettings::from_config(&config),
        );

        let notifier = MerchantNotifier::new(
            store.clone(),
            store.clone(),
            calculator.schedule(),
            &config.notifier,
        )
        .context("Failed to create merchant notifier")?;

        let reconciler = WebhookReconciler::new(
            store.clone(),
            Arc::new(notifier),
            config.relayer.webhook_signing_key.clone(),
        );

        Ok(Self {
            config,
            database,
            store,
            calculator,
            checkout,
            verifier,
            submitter,
            reconciler,
        })
    }
}

/// Main application that coordinates all components
pub struct Application {
    state: Arc<AppState>,
    api_server: ApiServer,
}

impl Application {
    /// Create a new application instance
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing application components...");

        let database = Database::new(&config.database)
            .await
            .context("Failed to initialize database")?;

        database
            .migrate()
            .await
            .context("Failed to run database migrations")?;

        let state = Arc::new(AppState::new(config, database)?);

        let api_server = ApiServer::new(state.clone()).context("Failed to create API server")?;

        info!("Application components initialized successfully");

        Ok(Self { state, api_server })
    }

    /// Serve requests until `signal` resolves
    pub async fn run<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            host = %self.state.config.server.host,
            port = self.state.config.server.port,
            "Starting API server"
        );
        self.api_server.run(signal).await
    }

    /// Release resources after the server stopped
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down application...");

        self.state
            .database
            .close()
            .await
            .context("Failed to close database")?;
        info!("Database connections closed");

        Ok(())
    }
}
