//! Process entry point (feature `server`): wires configuration, store, checker, trigger,
//! scheduler, cleanup, and the admin API together and runs until signaled to stop.

// std
use std::sync::Arc;
// crates.io
use tokio_util::sync::CancellationToken;
use watchcast::{
	api::{self, BearerAuthenticator, RegistrationController},
	auth::NoopTokenProvider,
	checker::Checker,
	cleanup::{Cleanup, ParentRegistry},
	config::Config,
	http::Transport,
	registration::Registration,
	scheduler::Scheduler,
	security::GuardedResolver,
	store::{MemoryStore, Store},
};

/// Authenticator stub: the outer framework's token validation is out of scope for this service,
/// so every bearer is accepted as-is and used as the user id.
struct PassthroughAuthenticator;
#[async_trait::async_trait]
impl BearerAuthenticator for PassthroughAuthenticator {
	async fn authenticate(&self, bearer: &str) -> watchcast::Result<String> {
		Ok(bearer.trim_start_matches("Bearer ").to_string())
	}
}

/// Registry stub: without a wired-in outer framework there is no parent to consult, so every
/// watcher is treated as still having a live parent and cleanup never deletes anything.
struct NoopParentRegistry;
#[async_trait::async_trait]
impl ParentRegistry for NoopParentRegistry {
	async fn parent_exists(&self, _user_id: &str, _id: &str) -> watchcast::Result<bool> {
		Ok(true)
	}
}

struct RegistrationAdapter(Registration);
#[async_trait::async_trait]
impl RegistrationController for RegistrationAdapter {
	async fn delete_watcher(&self, user_id: &str, id: &str) -> watchcast::Result<bool> {
		self.0.delete_watcher(user_id, id).await
	}
}

/// Select a durable [`MongoStore`](watchcast::store::MongoStore) when the `mongodb` feature is
/// enabled and `mongo_url` is configured, falling back to the in-memory store otherwise.
async fn build_store(#[cfg_attr(not(feature = "mongodb"), allow(unused_variables))] config: &Config) -> watchcast::Result<Arc<dyn Store>> {
	#[cfg(feature = "mongodb")]
	if !config.mongo_url.is_empty() {
		let store = watchcast::store::MongoStore::connect(config).await?;

		return Ok(Arc::new(store));
	}

	Ok(Arc::new(MemoryStore::new()))
}

#[tokio::main]
async fn main() -> watchcast::Result<()> {
	watchcast::init_tracing();

	let config = Config::from_env()?;
	let watch_interval = config.watch_interval()?;
	let batch_size = usize::try_from(config.batch_size).unwrap_or(100);

	#[cfg(feature = "prometheus")]
	if let Err(err) = watchcast::metrics::install_default_exporter() {
		tracing::warn!(error = %err, "failed to install prometheus exporter");
	}

	let guard = if config.use_external_dns_for_checker {
		GuardedResolver::external(&config.external_dns_address)?
	} else {
		GuardedResolver::system()
	};
	let transport = Transport::new(guard)?;
	let tokens = Arc::new(NoopTokenProvider);
	let store = build_store(&config).await?;
	let checker = Checker::new(transport.clone(), tokens.clone());
	let trigger = watchcast::trigger::Trigger::new(transport, tokens);
	let scheduler = Scheduler::new(store.clone(), checker, trigger, batch_size);
	let cleanup = Cleanup::new(store.clone(), Arc::new(NoopParentRegistry));
	let cleanup_interval = watchcast::cleanup::interval_from_watch_interval(watch_interval);
	let registration = Registration::new(store, config.clone());

	let cancel = CancellationToken::new();
	let shutdown = cancel.clone();

	tokio::spawn(async move {
		let _ = tokio::signal::ctrl_c().await;

		tracing::info!("shutdown signal received");
		shutdown.cancel();
	});

	let router = api::register(
		axum::Router::new(),
		Arc::new(RegistrationAdapter(registration)),
		Arc::new(PassthroughAuthenticator),
	);
	let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;

	tokio::join!(
		scheduler.run(watch_interval, cancel.clone()),
		cleanup.run(cleanup_interval, cancel.clone()),
		async {
			let server =
				axum::serve(listener, router).with_graceful_shutdown(cancel.cancelled_owned());

			if let Err(err) = server.await {
				tracing::error!(error = %err, "admin API server exited with error");
			}
		},
	);

	Ok(())
}
