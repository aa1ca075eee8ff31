use secrecy::SecretString;

/// Tenant. `api_token` is compared in constant time against the caller's
/// `company_token` — see `services::payment_service::validate_tenancy`.
#[derive(Clone)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub contact_email: Option<String>,
    pub api_token: SecretString,
    pub active: bool,
}

impl std::fmt::Debug for Company {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Company")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("api_token", &"[redacted]")
            .finish()
    }
}
