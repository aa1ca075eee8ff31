pub mod payment_service;
pub mod webhook_router;
