//! Application use cases. Orchestrate domain logic via ports.

pub mod application_service;
pub mod approval_service;
pub mod broadcaster;
pub mod inbox_service;
pub mod invoice_service;
pub mod navigator_service;
pub mod relay_service;
pub mod router;
pub mod scheduler_service;

#[cfg(test)]
mod test_support;

pub use application_service::ApplicationService;
pub use approval_service::ApprovalService;
pub use broadcaster::Broadcaster;
pub use inbox_service::{Desk, InboxService};
pub use invoice_service::InvoiceService;
pub use navigator_service::NavigatorService;
pub use relay_service::RelayService;
pub use router::Router;
pub use scheduler_service::{Reminder, SchedulerService};
