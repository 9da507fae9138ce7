//! B2B order Excel import handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subject, Subscriber};
use chrono::{DateTime, NaiveDate, Utc};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::{self, AuthInfo};
use crate::services::excel_helper::build_excel_helper;
use crate::services::import_history::{ImportHistoryResponse, IMPORT_HISTORY};
use crate::services::importer::import_data;
use crate::services::intake::check_file;
use crate::services::order_store::OrderStore;
use crate::services::template::render_template;
use crate::services::validator::{preview_upload, PipelineError};
use crate::types::{
    EmptyPayload, ErrorResponse, ExcelHelper, ImportEnvelope, ImportResult, ImportUploadRequest,
    PreviewSummary, PreviewUploadRequest, Request, SuccessResponse, TemplateDownloadRequest,
    TemplateDownloadResponse, UploadFile, UploadPayload,
};

/// Permission needed to commit an import
pub const IMPORT_PERMISSION: &str = "b2b.orders.import";

/// Shared dependencies of the import handlers
pub struct ImportContext {
    pub store: Arc<dyn OrderStore>,
    pub jwt_secret: Arc<String>,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Reply sent for one request: a success envelope or an error
pub type Reply<T> = std::result::Result<SuccessResponse<T>, ErrorResponse>;

async fn publish<T: Serialize>(client: &Client, reply: Subject, value: &T) -> Result<()> {
    let _ = client.publish(reply, serde_json::to_vec(value)?.into()).await;
    Ok(())
}

async fn publish_reply<T: Serialize>(client: &Client, reply: Subject, response: Reply<T>) -> Result<()> {
    match response {
        Ok(success) => publish(client, reply, &success).await,
        Err(error) => publish(client, reply, &error).await,
    }
}

/// Parse and authenticate a request
fn accept<T: DeserializeOwned>(payload: &[u8], jwt_secret: &str) -> std::result::Result<(Request<T>, AuthInfo), ErrorResponse> {
    let request: Request<T> = serde_json::from_slice(payload).map_err(|e| {
        error!("Failed to parse request: {}", e);
        ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string())
    })?;

    match auth::extract_auth(&request, jwt_secret) {
        Ok(info) => Ok((request, info)),
        Err(_) => Err(ErrorResponse::new(request.id, "UNAUTHORIZED", "Authentication required")),
    }
}

/// Decode the upload and run intake again; the client check is not trusted
fn accept_file(
    request_id: Uuid,
    payload: &UploadPayload,
    max_upload_bytes: u64,
) -> std::result::Result<UploadFile, ErrorResponse> {
    let file = UploadFile::from_payload(payload)
        .map_err(|e| ErrorResponse::new(request_id, "INVALID_REQUEST", format!("{:#}", e)))?;
    if let Err(e) = check_file(&file, max_upload_bytes) {
        warn!("Rejected upload '{}': {}", file.filename, e);
        return Err(ErrorResponse::new(request_id, "FILE_REJECTED", e.to_string()));
    }
    Ok(file)
}

pub fn template_reply(jwt_secret: &str, payload: &[u8], today: NaiveDate) -> Reply<TemplateDownloadResponse> {
    let (request, _auth) = accept::<TemplateDownloadRequest>(payload, jwt_secret)?;

    match render_template(request.payload.format, request.payload.mode, today) {
        Ok(template) => Ok(SuccessResponse::new(request.id, template.to_response())),
        Err(e) => {
            error!("Failed to render template: {}", e);
            Err(ErrorResponse::new(request.id, "TEMPLATE_ERROR", e.to_string()))
        }
    }
}

pub async fn preview_reply(ctx: &ImportContext, payload: &[u8], today: NaiveDate) -> Reply<ImportEnvelope<PreviewSummary>> {
    let (request, _auth) = accept::<PreviewUploadRequest>(payload, &ctx.jwt_secret)?;
    let file = accept_file(request.id, &request.payload.file, ctx.max_upload_bytes)?;

    let mode = request.payload.import_mode;
    let envelope = match preview_upload(ctx.store.as_ref(), &file, mode, today).await {
        Ok(summary) => {
            info!(
                "Preview of '{}' ({}): {} rows, {} valid",
                file.filename, mode, summary.total_rows, summary.valid_rows
            );
            let message = format!("{} of {} rows are valid", summary.valid_rows, summary.total_rows);
            ImportEnvelope::ok(message, summary)
        }
        Err(PipelineError::Sheet(e)) => {
            warn!("Could not parse '{}': {}", file.filename, e);
            ImportEnvelope::failed_with_code("PARSE_ERROR", e.to_string())
        }
        Err(PipelineError::Store(e)) => {
            error!("Preview of '{}' failed: {}", file.filename, e);
            return Err(ErrorResponse::new(request.id, "STORE_ERROR", e.to_string()));
        }
    };

    Ok(SuccessResponse::new(request.id, envelope))
}

/// Commit an upload and record it in the import history
pub async fn import_reply(
    ctx: &ImportContext,
    payload: &[u8],
    started_at: DateTime<Utc>,
) -> Reply<ImportEnvelope<ImportResult>> {
    let (request, auth_info) = accept::<ImportUploadRequest>(payload, &ctx.jwt_secret)?;
    if !auth_info.has_permission(IMPORT_PERMISSION) {
        warn!("User {} tried to import without {}", auth_info.user_id, IMPORT_PERMISSION);
        return Err(ErrorResponse::new(request.id, "FORBIDDEN", "Missing permission to import orders"));
    }
    let file = accept_file(request.id, &request.payload.file, ctx.max_upload_bytes)?;

    let options = request.payload.options;
    let record = |result: &ImportResult, error: Option<String>| {
        IMPORT_HISTORY.record(auth_info.user_id, &file.filename, options.import_mode, started_at, result, error);
    };

    let outcome = import_data(ctx.store.as_ref(), &file, options, auth_info.user_id, started_at.date_naive()).await;
    let envelope = match outcome {
        Ok(envelope) => {
            if let Some(result) = &envelope.data {
                record(result, None);
            }
            envelope
        }
        Err(PipelineError::Sheet(e)) => {
            warn!("Could not parse '{}': {}", file.filename, e);
            record(&ImportResult::default(), Some(e.to_string()));
            ImportEnvelope::failed_with_code("PARSE_ERROR", e.to_string())
        }
        Err(PipelineError::Store(e)) => {
            error!("Import of '{}' failed: {}", file.filename, e);
            record(&ImportResult::default(), Some(e.to_string()));
            return Err(ErrorResponse::new(request.id, "STORE_ERROR", e.to_string()));
        }
    };

    Ok(SuccessResponse::new(request.id, envelope))
}

pub async fn helper_reply(ctx: &ImportContext, payload: &[u8]) -> Reply<ExcelHelper> {
    let (request, _auth) = accept::<EmptyPayload>(payload, &ctx.jwt_secret)?;

    match build_excel_helper(ctx.store.as_ref()).await {
        Ok(helper) => Ok(SuccessResponse::new(request.id, helper)),
        Err(e) => {
            error!("Failed to build excel helper: {}", e);
            Err(ErrorResponse::new(request.id, "STORE_ERROR", e.to_string()))
        }
    }
}

/// Admins see every import, everyone else only their own
pub fn history_reply(jwt_secret: &str, payload: &[u8]) -> Reply<ImportHistoryResponse> {
    let (request, auth_info) = accept::<HistoryRequest>(payload, jwt_secret)?;

    let limit = request.payload.limit.unwrap_or(50).min(100);
    let history = if auth_info.role == "admin" {
        IMPORT_HISTORY.get_recent(limit)
    } else {
        IMPORT_HISTORY.get_recent_for_user(auth_info.user_id, limit)
    };
    Ok(SuccessResponse::new(request.id, history))
}

/// Handle b2b.orders.excel.template requests
pub async fn handle_template(client: Client, mut subscriber: Subscriber, jwt_secret: Arc<String>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let response = template_reply(&jwt_secret, &msg.payload, Utc::now().date_naive());
        publish_reply(&client, reply, response).await?;
    }

    Ok(())
}

/// Handle b2b.orders.excel.preview requests
pub async fn handle_preview(client: Client, mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let response = preview_reply(&ctx, &msg.payload, Utc::now().date_naive()).await;
        publish_reply(&client, reply, response).await?;
    }

    Ok(())
}

/// Handle b2b.orders.excel.import requests
pub async fn handle_import(client: Client, mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let response = import_reply(&ctx, &msg.payload, Utc::now()).await;
        publish_reply(&client, reply, response).await?;
    }

    Ok(())
}

/// Handle b2b.orders.excel.helper requests
pub async fn handle_helper(client: Client, mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        let response = helper_reply(&ctx, &msg.payload).await;
        publish_reply(&client, reply, response).await?;
    }

    Ok(())
}

/// Handle b2b.orders.excel.history requests
pub async fn handle_history(client: Client, mut subscriber: Subscriber, jwt_secret: Arc<String>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref r) => r.clone(),
            None => continue,
        };

        publish_reply(&client, reply, history_reply(&jwt_secret, &msg.payload)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::services::order_store::MemoryOrderStore;
    use crate::types::{
        B2bCustomer, B2bOrder, Category, CreateB2bCustomerRequest, CreateB2bOrderRequest, ImportMode,
        ImportOptions, TemplateFormat, MIME_CSV, MIME_XLSX,
    };

    const SECRET: &str = "test-secret-key-for-jwt-at-least-32-bytes-long";
    const ORDERS_CSV: &str = "company_name,contact_person,email,phone,service_name,custom_price\n\
                              Acme,Priya,ops@acme.in,9876543210,Deep cleaning,2499\n";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn context(store: Arc<dyn OrderStore>, max_upload_bytes: u64) -> ImportContext {
        ImportContext { store, jwt_secret: Arc::new(SECRET.to_string()), max_upload_bytes }
    }

    fn token(user_id: Uuid, role: &str, permissions: &[&str]) -> Option<String> {
        let permissions: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
        Some(auth::generate_token(user_id, "ops@example.com", role, &permissions, SECRET).unwrap())
    }

    fn request_bytes<T: Serialize>(token: Option<String>, payload: T) -> Vec<u8> {
        let request = Request { id: Uuid::new_v4(), timestamp: Utc::now(), token, payload };
        serde_json::to_vec(&request).unwrap()
    }

    fn preview_bytes(token: Option<String>, file: UploadFile) -> Vec<u8> {
        request_bytes(
            token,
            PreviewUploadRequest { file: file.to_payload(), import_mode: ImportMode::CreateCustomers },
        )
    }

    fn import_bytes(token: Option<String>, file: UploadFile) -> Vec<u8> {
        let options = ImportOptions {
            skip_invalid: true,
            create_customers: true,
            import_mode: ImportMode::CreateCustomers,
        };
        request_bytes(token, ImportUploadRequest { file: file.to_payload(), options })
    }

    fn orders_csv() -> UploadFile {
        UploadFile::new("orders.csv", MIME_CSV, ORDERS_CSV.as_bytes().to_vec())
    }

    struct UnavailableStore;

    #[async_trait]
    impl OrderStore for UnavailableStore {
        async fn find_customer_by_id(&self, _customer_id: i64) -> anyhow::Result<Option<B2bCustomer>> {
            Err(anyhow!("database is down"))
        }

        async fn find_customer_by_identity(&self, _company_name: &str, _email: &str) -> anyhow::Result<Option<B2bCustomer>> {
            Err(anyhow!("database is down"))
        }

        async fn create_customer(&self, _req: &CreateB2bCustomerRequest) -> anyhow::Result<B2bCustomer> {
            Err(anyhow!("database is down"))
        }

        async fn list_categories(&self) -> anyhow::Result<Vec<Category>> {
            Err(anyhow!("database is down"))
        }

        async fn next_order_sequence(&self) -> anyhow::Result<i64> {
            Err(anyhow!("database is down"))
        }

        async fn create_order(&self, _req: &CreateB2bOrderRequest) -> anyhow::Result<B2bOrder> {
            Err(anyhow!("database is down"))
        }

        fn name(&self) -> &'static str {
            "unavailable"
        }
    }

    #[test]
    fn template_requires_a_valid_token() {
        let payload = TemplateDownloadRequest { format: TemplateFormat::Csv, mode: ImportMode::CustomerId };

        let err = template_reply(SECRET, &request_bytes(None, payload.clone()), today()).unwrap_err();
        assert_eq!(err.error.code, "UNAUTHORIZED");

        let ok = template_reply(SECRET, &request_bytes(token(Uuid::new_v4(), "staff", &[]), payload), today()).unwrap();
        assert_eq!(ok.payload.filename, "b2b_orders_template_customer_id.csv");
    }

    #[tokio::test]
    async fn malformed_request_is_invalid() {
        let ctx = context(Arc::new(MemoryOrderStore::new()), 1024);
        let err = preview_reply(&ctx, b"{not json", today()).await.unwrap_err();
        assert_eq!(err.error.code, "INVALID_REQUEST");
        assert_eq!(err.id, Uuid::nil());
    }

    #[tokio::test]
    async fn server_repeats_intake_checks() {
        let ctx = context(Arc::new(MemoryOrderStore::new()), 64);
        let auth = token(Uuid::new_v4(), "admin", &[]);

        let pdf = UploadFile::new("orders.pdf", "application/pdf", b"%PDF-1.7".to_vec());
        let err = preview_reply(&ctx, &preview_bytes(auth.clone(), pdf), today()).await.unwrap_err();
        assert_eq!(err.error.code, "FILE_REJECTED");

        let oversized = UploadFile::new("orders.csv", MIME_CSV, vec![b'a'; 65]);
        let err = preview_reply(&ctx, &preview_bytes(auth.clone(), oversized), today()).await.unwrap_err();
        assert_eq!(err.error.code, "FILE_REJECTED");
        assert!(err.error.message.contains("64 bytes"));

        let empty = UploadFile::new("orders.csv", MIME_CSV, Vec::new());
        let err = import_reply(&ctx, &import_bytes(auth, empty), Utc::now()).await.unwrap_err();
        assert_eq!(err.error.code, "FILE_REJECTED");
    }

    #[tokio::test]
    async fn unreadable_workbook_is_a_parse_error_envelope() {
        let ctx = context(Arc::new(MemoryOrderStore::new()), 1024);
        let garbage = UploadFile::new("orders.xlsx", MIME_XLSX, b"not a workbook".to_vec());

        let reply = preview_reply(&ctx, &preview_bytes(token(Uuid::new_v4(), "admin", &[]), garbage), today())
            .await
            .unwrap();
        assert!(!reply.payload.success);
        assert!(reply.payload.data.is_none());
        assert_eq!(reply.payload.error_code.as_deref(), Some("PARSE_ERROR"));
    }

    #[tokio::test]
    async fn preview_replies_with_summary() {
        let ctx = context(Arc::new(MemoryOrderStore::with_demo_catalog()), 1024);
        let reply = preview_reply(&ctx, &preview_bytes(token(Uuid::new_v4(), "staff", &[]), orders_csv()), today())
            .await
            .unwrap();
        assert!(reply.payload.success);
        let summary = reply.payload.data.unwrap();
        assert_eq!(summary.total_rows, 1);
        assert_eq!(summary.valid_rows, 1);
    }

    #[tokio::test]
    async fn import_requires_permission() {
        let store = Arc::new(MemoryOrderStore::with_demo_catalog());
        let ctx = context(store.clone(), 1024);
        let user_id = Uuid::new_v4();

        let err = import_reply(&ctx, &import_bytes(token(user_id, "staff", &[]), orders_csv()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.error.code, "FORBIDDEN");
        assert!(store.orders().is_empty());
        assert_eq!(IMPORT_HISTORY.get_recent_for_user(user_id, 10).total, 0);

        let reply = import_reply(
            &ctx,
            &import_bytes(token(user_id, "staff", &[IMPORT_PERMISSION]), orders_csv()),
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(reply.payload.success);
        assert_eq!(store.orders().len(), 1);

        let history = IMPORT_HISTORY.get_recent_for_user(user_id, 10);
        assert_eq!(history.total, 1);
        assert_eq!(history.imports[0].status, "completed");
        assert_eq!(history.imports[0].filename, "orders.csv");
    }

    #[tokio::test]
    async fn store_outage_is_a_store_error() {
        let ctx = context(Arc::new(UnavailableStore), 1024);
        let user_id = Uuid::new_v4();

        let err = preview_reply(&ctx, &preview_bytes(token(user_id, "admin", &[]), orders_csv()), today())
            .await
            .unwrap_err();
        assert_eq!(err.error.code, "STORE_ERROR");

        let err = import_reply(&ctx, &import_bytes(token(user_id, "admin", &[]), orders_csv()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.error.code, "STORE_ERROR");

        let history = IMPORT_HISTORY.get_recent_for_user(user_id, 10);
        assert_eq!(history.imports[0].status, "failed");
        assert!(history.imports[0].error.as_deref().unwrap_or_default().contains("database is down"));

        let err = helper_reply(&ctx, &request_bytes(token(user_id, "admin", &[]), EmptyPayload {})).await.unwrap_err();
        assert_eq!(err.error.code, "STORE_ERROR");
    }

    #[tokio::test]
    async fn staff_history_is_limited_to_own_imports() {
        let ctx = context(Arc::new(MemoryOrderStore::with_demo_catalog()), 1024);
        let staff = Uuid::new_v4();
        let other = Uuid::new_v4();
        for user_id in [staff, other] {
            import_reply(&ctx, &import_bytes(token(user_id, "admin", &[]), orders_csv()), Utc::now())
                .await
                .unwrap();
        }

        let reply = history_reply(SECRET, &request_bytes(token(staff, "staff", &[]), HistoryRequest { limit: None })).unwrap();
        assert!(!reply.payload.imports.is_empty());
        assert!(reply.payload.imports.iter().all(|entry| entry.user_id == staff));
    }

    #[test]
    fn history_request_limit_is_optional() {
        let request: Request<HistoryRequest> = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","timestamp":"2026-01-01T00:00:00Z","payload":{}}"#,
        )
        .unwrap();
        assert!(request.payload.limit.is_none());
    }

    #[test]
    fn import_request_uses_camel_case_transport_fields() {
        let json = r#"{
            "file": {"filename": "orders.csv", "contentType": "text/csv", "fileBase64": "YSxiCg=="},
            "options": {"skip_invalid": true, "create_customers": false, "import_mode": "customer_id"}
        }"#;
        let request: ImportUploadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.file.content_type, "text/csv");
        assert!(request.options.skip_invalid);
        assert_eq!(request.options.import_mode, crate::types::ImportMode::CustomerId);
    }
}
