pub mod company_repo;
pub mod dispute_repo;
pub mod payment_repo;
pub mod provider_event_repo;
pub mod refund_repo;
pub mod webhook_inbox_repo;
