//! NATS message handlers

pub mod b2b_import;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::services::order_store::OrderStore;
use crate::types::subjects;

use b2b_import::ImportContext;

/// Room for the JSON request envelope around the base64 file
const REQUEST_OVERHEAD_BYTES: u64 = 4 * 1024;

/// Size of the NATS request carrying an upload of `upload_bytes`
pub fn request_payload_bytes(upload_bytes: u64) -> u64 {
    upload_bytes.div_ceil(3) * 4 + REQUEST_OVERHEAD_BYTES
}

/// Start all message handlers
pub async fn start_handlers(client: Client, store: Arc<dyn OrderStore>, config: &Config) -> Result<()> {
    info!("Starting message handlers...");
    info!("Order store initialized: {}", store.name());

    let max_payload = client.server_info().max_payload as u64;
    let needed = request_payload_bytes(config.max_upload_bytes);
    if needed > max_payload {
        warn!(
            "NATS max_payload is {} bytes but a {} byte upload needs about {}; \
             raise max_payload on the server or lower MAX_UPLOAD_BYTES",
            max_payload, config.max_upload_bytes, needed
        );
    }

    let jwt_secret = Arc::new(config.jwt_secret.clone());
    let ctx = Arc::new(ImportContext {
        store,
        jwt_secret: jwt_secret.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    // Subscribe to all subjects
    let ping_sub = client.subscribe(subjects::PING).await?;
    let template_sub = client.subscribe(subjects::TEMPLATE).await?;
    let preview_sub = client.subscribe(subjects::PREVIEW).await?;
    let import_sub = client.subscribe(subjects::IMPORT).await?;
    let helper_sub = client.subscribe(subjects::HELPER).await?;
    let history_sub = client.subscribe(subjects::HISTORY).await?;

    info!("Subscribed to NATS subjects");

    let client_ping = client.clone();
    let client_template = client.clone();
    let client_preview = client.clone();
    let client_import = client.clone();
    let client_helper = client.clone();
    let client_history = client.clone();

    let jwt_template = jwt_secret.clone();
    let jwt_history = jwt_secret;
    let ctx_preview = ctx.clone();
    let ctx_import = ctx.clone();
    let ctx_helper = ctx;

    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let template_handle = tokio::spawn(async move {
        b2b_import::handle_template(client_template, template_sub, jwt_template).await
    });

    let preview_handle = tokio::spawn(async move {
        b2b_import::handle_preview(client_preview, preview_sub, ctx_preview).await
    });

    let import_handle = tokio::spawn(async move {
        b2b_import::handle_import(client_import, import_sub, ctx_import).await
    });

    let helper_handle = tokio::spawn(async move {
        b2b_import::handle_helper(client_helper, helper_sub, ctx_helper).await
    });

    let history_handle = tokio::spawn(async move {
        b2b_import::handle_history(client_history, history_sub, jwt_history).await
    });

    info!("All handlers started");

    // Wait for any handler to finish (which would indicate an error)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = template_handle => {
            error!("Template handler finished: {:?}", result);
        }
        result = preview_handle => {
            error!("Preview handler finished: {:?}", result);
        }
        result = import_handle => {
            error!("Import handler finished: {:?}", result);
        }
        result = helper_handle => {
            error!("Excel helper handler finished: {:?}", result);
        }
        result = history_handle => {
            error!("Import history handler finished: {:?}", result);
        }
    }

    Ok(())
}
