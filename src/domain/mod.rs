//! Lifecycle model: closed status types per entity and the pure transition
//! rules. Nothing in here performs I/O; services load records, ask these
//! types what is allowed, then persist the result through the store.

pub mod application;
pub mod invoice;
pub mod lease;
pub mod maintenance;
pub mod payment;
pub mod unit;

pub use application::{Application, ApplicationDecision, ApplicationStatus};
pub use invoice::{BillingPeriod, Invoice, InvoiceStatus, InvoiceTotals, LineItem};
pub use lease::{Lease, LeaseDraft, LeaseResponse, LeaseStatus, LeaseTerms, LeaseTransition};
pub use maintenance::{
    MaintenanceTicket, NewTicket, TicketCategory, TicketPriority, TicketStatus, TimelineAction,
};
pub use payment::{Payment, PaymentMethod, PaymentStatus, PaymentTransition};
pub use unit::{Property, Unit, UnitStatus};
