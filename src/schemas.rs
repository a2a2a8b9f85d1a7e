use std::borrow::Cow;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    domain::{
        ApplicationStatus, InvoiceStatus, LeaseResponse, LeaseStatus, LeaseTerms, LineItem,
        PaymentMethod, TicketCategory, TicketPriority, TicketStatus, UnitStatus,
    },
    error::AppError,
};

const ALLOWED_DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "doc", "docx"];

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input.validate().map_err(AppError::from)
}

/// Uploaded document references: absolute http(s) URLs ending in a supported
/// extension.
pub fn validate_document_urls(urls: &[String]) -> Result<(), ValidationError> {
    for raw in urls {
        let Ok(parsed) = Url::parse(raw.trim()) else {
            return Err(document_error(raw, "is not a valid URL"));
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(document_error(raw, "must use http or https"));
        }
        let extension = parsed
            .path()
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(document_error(raw, "has an unsupported file type"));
        }
    }
    Ok(())
}

fn document_error(url: &str, reason: &str) -> ValidationError {
    ValidationError::new("document_url").with_message(Cow::Owned(format!("{url} {reason}.")))
}

fn validate_documents(urls: &Vec<String>) -> Result<(), ValidationError> {
    validate_document_urls(urls)
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdPath {
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 255))]
    pub address_line1: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUnitInput {
    #[validate(length(min = 1, max = 50))]
    pub unit_number: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 50))]
    pub bedrooms: i16,
    pub bathrooms: Option<Decimal>,
    pub rent_amount: Decimal,
    pub deposit_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnitStatusInput {
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitApplicationInput {
    pub unit_id: Uuid,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20), custom(function = "validate_documents"))]
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListApplicationsQuery {
    pub status: Option<ApplicationStatus>,
    pub unit_id: Option<Uuid>,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLeaseInput {
    pub application_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub rent_amount: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    #[validate(range(min = 1, max = 28))]
    pub due_day: Option<u32>,
    #[serde(default)]
    pub terms: LeaseTerms,
    #[serde(default)]
    #[validate(length(max = 20), custom(function = "validate_documents"))]
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondLeaseInput {
    pub decision: LeaseResponse,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListLeasesQuery {
    pub status: Option<LeaseStatus>,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoiceInput {
    pub lease_id: Uuid,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInvoiceInput {
    pub lease_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentInput {
    pub invoice_id: Uuid,
    pub method: PaymentMethod,
    pub amount: Option<Decimal>,
    #[validate(length(min = 1, max = 255))]
    pub provider_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTicketInput {
    pub unit_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[serde(default)]
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    #[validate(length(max = 10), custom(function = "validate_documents"))]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignTicketInput {
    pub staff_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TicketStatusInput {
    pub status: TicketStatus,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CloseTicketInput {
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTicketsQuery {
    pub unit_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub limit: i64,
}
