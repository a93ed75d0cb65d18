//! JSON-over-HTTP invoice source.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET    /invoices/{id}`   one invoice, `If-None-Match` for conditional fetch
//! - `GET    /invoices`        invoices matching query parameters
//! - `PUT    /invoices/{id}`   create or replace, `If-Match` carries the base version
//! - `DELETE /invoices/{id}`

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, ACCEPT, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    classify_status, FetchOutcome, PushOutcome, RemoteInvoice, RemoteResult, RemoteSource,
    RemoveOutcome, TransportError,
};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{
    Invoice, InvoiceDraft, InvoiceFilter, InvoiceId, InvoiceStatus, LineItem, VersionToken,
};
use crate::util::compact_text;

/// Remote source backed by the invoice REST API
#[derive(Clone)]
pub struct HttpRemoteSource {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl std::fmt::Debug for HttpRemoteSource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRemoteSource {
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Result<Self> {
        let config = config.clone().normalized()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            client,
            base_url: config.base_url,
            auth_token: config.auth_token,
        })
    }

    fn invoice_url(&self, id: InvoiceId) -> String {
        format!("{}/invoices/{id}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(ACCEPT, "application/json");
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> RemoteResult<Response> {
        builder.send().await.map_err(map_reqwest_error)
    }
}

impl RemoteSource for HttpRemoteSource {
    fn source_name(&self) -> String {
        self.base_url.clone()
    }

    async fn fetch(
        &self,
        id: InvoiceId,
        known: Option<&VersionToken>,
    ) -> RemoteResult<FetchOutcome> {
        let mut request = self.authorized(self.client.get(self.invoice_url(id)));
        if let Some(version) = known {
            request = request.header(IF_NONE_MATCH, version.as_str());
        }
        let response = Self::send(request).await?;

        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::NotModified),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(FetchOutcome::NotFound),
            status if status.is_success() => {
                let etag = header_version(response.headers());
                let dto = response
                    .json::<InvoiceDto>()
                    .await
                    .map_err(|error| TransportError::Malformed(error.to_string()))?;
                let remote = dto.into_remote(etag)?;
                if remote.invoice.id != id {
                    return Err(TransportError::Malformed(format!(
                        "asked for invoice {id}, received {}",
                        remote.invoice.id
                    )));
                }
                Ok(FetchOutcome::Found(remote))
            }
            status => Err(error_from_response(status, response).await),
        }
    }

    async fn fetch_all(&self, filter: &InvoiceFilter) -> RemoteResult<Vec<RemoteInvoice>> {
        let request = self
            .authorized(self.client.get(format!("{}/invoices", self.base_url)))
            .query(&filter_query(filter));
        let response = Self::send(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }

        let page = response
            .json::<InvoiceListDto>()
            .await
            .map_err(|error| TransportError::Malformed(error.to_string()))?;
        page.invoices
            .into_iter()
            .map(|dto| dto.into_remote(None))
            .collect()
    }

    async fn push(
        &self,
        invoice: &Invoice,
        base: Option<&VersionToken>,
    ) -> RemoteResult<PushOutcome> {
        let mut request = self
            .authorized(self.client.put(self.invoice_url(invoice.id)))
            .json(&InvoiceDto::from_invoice(invoice));
        if let Some(version) = base {
            request = request.header(IF_MATCH, version.as_str());
        }
        let response = Self::send(request).await?;

        match response.status() {
            status if status.is_success() => {
                let etag = header_version(response.headers());
                let body = response.text().await.unwrap_or_default();
                let version = etag
                    .or_else(|| {
                        serde_json::from_str::<PushAckDto>(&body)
                            .ok()
                            .map(|ack| VersionToken::new(ack.version))
                    })
                    .ok_or_else(|| {
                        TransportError::Malformed("push acknowledged without a version".into())
                    })?;
                Ok(PushOutcome::Accepted(version))
            }
            status @ (StatusCode::BAD_REQUEST
            | StatusCode::CONFLICT
            | StatusCode::PRECONDITION_FAILED
            | StatusCode::UNPROCESSABLE_ENTITY) => {
                let body = response.text().await.unwrap_or_default();
                let reason = parse_api_message(&body)
                    .unwrap_or_else(|| format!("rejected with HTTP {}", status.as_u16()));
                Ok(PushOutcome::Rejected(reason))
            }
            status => Err(error_from_response(status, response).await),
        }
    }

    async fn remove(&self, id: InvoiceId) -> RemoteResult<RemoveOutcome> {
        let request = self.authorized(self.client.delete(self.invoice_url(id)));
        let response = Self::send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(RemoveOutcome::NotFound),
            status if status.is_success() => Ok(RemoveOutcome::Accepted),
            status => Err(error_from_response(status, response).await),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct InvoiceDto {
    id: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    amount: Decimal,
    status: InvoiceStatus,
    customer_ref: String,
    #[serde(default)]
    line_items: Vec<LineItem>,
    updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl InvoiceDto {
    fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id.to_string(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            amount: invoice.amount,
            status: invoice.status,
            customer_ref: invoice.customer_ref.clone(),
            line_items: invoice.line_items.clone(),
            updated_at: invoice.updated_at,
            version: None,
        }
    }

    /// Invariant violations in incoming data are malformed responses.
    fn into_remote(self, etag: Option<VersionToken>) -> RemoteResult<RemoteInvoice> {
        let id: InvoiceId = self
            .id
            .parse()
            .map_err(|_| TransportError::Malformed(format!("invalid invoice id '{}'", self.id)))?;
        let version = etag
            .or_else(|| self.version.map(VersionToken::new))
            .ok_or_else(|| TransportError::Malformed(format!("invoice {id} has no version")))?;
        let draft = InvoiceDraft {
            issue_date: self.issue_date,
            due_date: self.due_date,
            amount: self.amount,
            status: self.status,
            customer_ref: self.customer_ref,
            line_items: self.line_items,
        };
        let invoice = Invoice::with_id(id, draft, self.updated_at)
            .map_err(|error| TransportError::Malformed(format!("invoice {id}: {error}")))?;
        Ok(RemoteInvoice { invoice, version })
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceListDto {
    #[serde(default)]
    invoices: Vec<InvoiceDto>,
}

#[derive(Debug, Deserialize)]
struct PushAckDto {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn filter_query(filter: &InvoiceFilter) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if !filter.statuses.is_empty() {
        let statuses = filter
            .statuses
            .iter()
            .map(|status| status.as_str())
            .collect::<Vec<_>>()
            .join(",");
        query.push(("status", statuses));
    }
    if let Some(from) = filter.issued_from {
        query.push(("issued_from", from.to_string()));
    }
    if let Some(to) = filter.issued_to {
        query.push(("issued_to", to.to_string()));
    }
    if let Some(min) = filter.min_amount {
        query.push(("min_amount", min.to_string()));
    }
    if let Some(max) = filter.max_amount {
        query.push(("max_amount", max.to_string()));
    }
    if let Some(customer) = filter.customer_ref.as_deref().map(str::trim) {
        if !customer.is_empty() {
            query.push(("customer_ref", customer.to_string()));
        }
    }
    query
}

fn header_version(headers: &HeaderMap) -> Option<VersionToken> {
    headers
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(VersionToken::new)
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() {
        TransportError::Malformed(error.to_string())
    } else {
        TransportError::Unreachable(error.to_string())
    }
}

async fn error_from_response(status: StatusCode, response: Response) -> TransportError {
    let body = response.text().await.unwrap_or_default();
    let message = parse_api_message(&body).unwrap_or_else(|| compact_text(&body));
    classify_status(status.as_u16(), message)
}

fn parse_api_message(body: &str) -> Option<String> {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            let message = message.trim();
            if !message.is_empty() {
                return Some(compact_text(message));
            }
        }
    }
    let trimmed = compact_text(body);
    (!trimmed.is_empty()).then_some(trimmed)
}
