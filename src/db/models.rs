use crate::social::provider::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "appointment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "invoice_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// --- clinic -----------------------------------------------------------------

/// A pet owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Pet {
    pub id: i64,
    pub patient_id: i64,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub weight_kg: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPet {
    pub patient_id: i64,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PetPatch {
    pub name: Option<String>,
    pub species: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<String>,
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Appointment {
    pub id: i64,
    pub pet_id: i64,
    pub employee_id: Option<i64>,
    pub scheduled_at: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    pub pet_id: i64,
    pub employee_id: Option<i64>,
    pub scheduled_at: DateTime<Utc>,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentPatch {
    pub employee_id: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub due_on: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInvoice {
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub amount_cents: i64,
    pub due_on: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoicePatch {
    pub amount_cents: Option<i64>,
    pub status: Option<InvoiceStatus>,
    pub due_on: Option<String>,
}

/// Rows removed by [`Storage::delete_patient`](crate::db::Storage::delete_patient).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatientDeletion {
    pub pets: u64,
    pub appointments: u64,
    pub invoices: u64,
}

// --- staff ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub email: Option<String>,
    pub salary_cents: i64,
    pub hired_on: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEmployee {
    pub name: String,
    pub role: String,
    pub email: Option<String>,
    pub salary_cents: i64,
    pub hired_on: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeePatch {
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub salary_cents: Option<i64>,
    pub hired_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payroll {
    pub id: i64,
    pub employee_id: i64,
    pub period: String,
    pub gross_cents: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPayroll {
    pub employee_id: i64,
    pub period: String,
    pub gross_cents: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayrollPatch {
    pub period: Option<String>,
    pub gross_cents: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmployeeDeletion {
    pub payrolls: u64,
    pub unassigned_appointments: u64,
}

// --- storefront -------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub price_cents: i64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub price_cents: i64,
    pub stock: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub stock: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub customer_email: String,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// One cart line handed to checkout.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
}

// --- relay ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Thread {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub thread_id: i64,
    pub sender: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub message_count: i64,
    pub last_message: Option<Message>,
}

// --- integrations -----------------------------------------------------------

/// A connected social-media account. Token material never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SocialAccount {
    pub id: i64,
    pub provider: Provider,
    pub account_id: String,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing)]
    pub token_secret: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSocialAccount {
    pub provider: Provider,
    pub account_id: String,
    pub display_name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_secret: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
