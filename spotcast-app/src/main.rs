mod server;

use crate::server::EventSink;
use spotcast_chromecast::{ChromecastConnector, MdnsDiscovery};
use spotcast_core::{
    CoreError, DeviceDirectory, DirectorySettings, Dispatcher, Player, PlayerService, Resolver,
    ResolverSettings, SpotcastConfig,
};
use spotcast_spotify_api::{
    SPOTIFY_CONFIG_TEMPLATE, SpotifyCatalog, SpotifyOAuth, SpotifyPlayback, SpotifyProviderConfig,
    TokenRefresher,
};
use std::fs::File;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Logging is set up before the full config load so config errors are logged
    init_tracing(peek_logging_config());

    let provider_templates: &[&str] = &[SPOTIFY_CONFIG_TEMPLATE];
    let config = match SpotcastConfig::load_or_create(Some(provider_templates)) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!(
                "A configuration file has been created at {}. Add your Spotify client_id and \
                 client_secret (https://developer.spotify.com/dashboard) and restart.",
                path.display()
            );
            std::process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let spotify_config = match spotify_provider_config(&config) {
        Ok(spotify_config) => spotify_config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let cancel_token = CancellationToken::new();
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    if let Err(e) = runtime.block_on(run(&config, &spotify_config, cancel_token)) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn spotify_provider_config(config: &SpotcastConfig) -> Result<SpotifyProviderConfig, CoreError> {
    let spotify_config = SpotifyProviderConfig::from_providers(&config.providers)?.ok_or_else(|| {
        CoreError::ConfigMissingField {
            field: "providers.spotify".into(),
        }
    })?;
    spotify_config.validate()?;
    Ok(spotify_config)
}

/// Authenticate, wire the collaborators together and serve events until shutdown.
async fn run(
    config: &SpotcastConfig,
    spotify_config: &SpotifyProviderConfig,
    cancel_token: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let oauth = Arc::new(SpotifyOAuth::new(
        &spotify_config.client_id,
        &spotify_config.client_secret,
        &spotify_config.oauth_redirect_uri,
    ));
    oauth.ensure_authenticated().await?;
    info!("Spotify authenticated successfully!");

    let catalog = Arc::new(SpotifyCatalog::new(
        oauth.clone(),
        &config.playback.country,
        &config.playback.language,
    ));
    let playback = Arc::new(SpotifyPlayback::new(oauth.clone()));

    let settings = DirectorySettings::from_config(config);
    let directory = Arc::new(DeviceDirectory::new(
        &config.aliases.devices,
        playback.clone(),
        Arc::new(MdnsDiscovery::new()),
        Arc::new(ChromecastConnector::new(settings.connect_timeout)),
        oauth.clone(),
        settings,
    ));

    // Populate the endpoint table in the background; lookups sweep again on a miss
    let sweep_directory = directory.clone();
    let discovery = tokio::spawn(async move {
        let found = sweep_directory.discover().await;
        info!("Initial discovery found {} cast endpoint(s)", found);
    });

    let resolver = Arc::new(Resolver::new(catalog, ResolverSettings::from_config(config)));
    let dispatcher = Arc::new(Dispatcher::new(directory.clone(), playback.clone()));
    let player = Arc::new(Player::new(resolver, dispatcher, playback, directory));

    let service = Arc::new(PlayerService::new(player, Some(cancel_token.clone())));
    let sink: Arc<dyn EventSink> = Arc::new(service.handle());
    let worker = service.start();

    let refresher = Arc::new(TokenRefresher::new(
        oauth,
        spotify_config.refresh_interval(),
        Some(cancel_token.clone()),
    ))
    .start();

    let served = server::serve(&config.server, sink, cancel_token.clone()).await;

    // The server only returns on shutdown or failure; stop everything else either way
    cancel_token.cancel();
    discovery.abort();
    let _ = worker.await;
    let _ = refresher.await;
    info!("Spotcast stopped");

    served.map_err(Into::into)
}

/// Logging settings read straight from the config file, before it is validated.
/// Missing or unreadable files mean defaults.
fn peek_logging_config() -> (bool, bool) {
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
        #[serde(default)]
        debug: bool,
    }

    let Ok(content) = std::fs::read_to_string(SpotcastConfig::config_path()) else {
        return (false, false);
    };
    toml::from_str::<PartialConfig>(&content)
        .map(|c| (c.logging.enabled, c.logging.debug))
        .unwrap_or((false, false))
}

/// Console output plus an optional file layer in the cache directory
fn init_tracing((file_logging_enabled, debug): (bool, bool)) {
    let default_filter = if debug {
        "debug,rspotify_http=warn,mdns_sd=warn"
    } else {
        "info,rspotify_http=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let fmt_layer = tracing_subscriber::fmt::layer();

    if file_logging_enabled {
        let log_path = spotcast_core::paths::log_file_path();
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
