// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use secure_share_server::{
    access::{AccessProtocol, CapabilitySigner, OtpStore},
    api::router,
    config::{AppConfig, LogFormat, DEFAULT_LOG_FILTER},
    delivery::{Notifier, WebhookNotifier},
    keyring::KeyRing,
    scanner::{ClamdScanner, DisabledScanner, MalwareScanner},
    shares::ShareLifecycle,
    state::{AppState, AuthConfig},
    storage::{AuditLog, FsContentStore, ShareDatabase, StoragePaths},
    transfer::{ExpirySweeper, TransferComponents, TransferService, TransferSettings},
};

/// Time allowed for in-flight requests after a shutdown signal.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_format);

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let paths = StoragePaths::new(&config.data_dir);
    info!(data_dir = %config.data_dir.display(), "Opening storage");

    let content = FsContentStore::open(paths.clone())
        .await
        .expect("Failed to open content store");
    let shares = ShareDatabase::open(&paths.database_file()).expect("Failed to open share database");

    let keys_dir = paths.keys_dir();
    let rsa_key_bits = config.rsa_key_bits;
    let keyring = tokio::task::spawn_blocking(move || KeyRing::open(keys_dir, rsa_key_bits))
        .await
        .expect("Key ring task panicked")
        .expect("Failed to open key ring");
    info!(current = %keyring.current_version(), "Key ring ready");

    let (lifecycle, expired_rx) = ShareLifecycle::new(Arc::new(shares), config.share_ttl);

    let access = AccessProtocol::new(
        CapabilitySigner::new(config.access_token_secret.expose(), config.share_ttl),
        OtpStore::new(
            config.access_token_secret.expose(),
            config.otp_cache_capacity,
            config.otp_ttl,
        ),
        Arc::clone(&lifecycle),
    );

    let scanner: Arc<dyn MalwareScanner> = match &config.clamd_addr {
        Some(addr) => {
            info!(clamd = %addr, "Malware scanning enabled");
            Arc::new(ClamdScanner::new(addr.clone(), config.scan_timeout))
        }
        None => {
            warn!("CLAMD_ADDR not set; uploads will NOT be scanned for malware");
            Arc::new(DisabledScanner)
        }
    };

    let notifier: Arc<dyn Notifier> = Arc::new(
        WebhookNotifier::new(
            config.primary_webhook_url.clone(),
            config.secondary_webhook_url.clone(),
        )
        .expect("Failed to build delivery client"),
    );

    let service = Arc::new(TransferService::new(
        TransferComponents {
            keyring: Arc::new(keyring),
            lifecycle,
            access,
            content: Arc::new(content),
            scanner,
            notifier,
            audit: Arc::new(AuditLog::new(paths)),
        },
        TransferSettings {
            rotation_interval: config.key_rotation_interval,
            gc_delay: config.key_gc_delay,
            public_download_url: config.public_download_url.clone(),
        },
    ));

    // Background tasks
    let shutdown = CancellationToken::new();
    let listener_task = tokio::spawn(
        Arc::clone(&service).run_expiry_listener(expired_rx, shutdown.clone()),
    );
    let sweeper_task = tokio::spawn(
        ExpirySweeper::new(Arc::clone(&service))
            .with_interval(config.sweep_interval)
            .run(shutdown.clone()),
    );

    let state = AppState::new(service, AuthConfig::new(config.auth_jwt_secret.expose()))
        .with_max_upload_bytes(config.max_upload_bytes);
    let app = router(state);

    let addr: SocketAddr = config.bind_address();

    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .expect("Failed to load TLS certificate and key");

            let handle = axum_server::Handle::new();
            let signal_handle = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                signal_handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
            });

            info!("Secure share server listening on https://{addr} (docs at /docs)");
            if let Err(e) = axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
            {
                error!(error = %e, "HTTPS server failed");
            }
        }
        None => {
            warn!("TLS_CERT_PATH/TLS_KEY_PATH not set; serving plain HTTP");
            let listener = TcpListener::bind(addr)
                .await
                .expect("Failed to bind listener");

            info!("Secure share server listening on http://{addr} (docs at /docs)");
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                error!(error = %e, "HTTP server failed");
            }
        }
    }

    shutdown.cancel();
    let _ = tokio::join!(listener_task, sweeper_task);
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
