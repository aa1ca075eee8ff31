use crate::domain::{company::Company, error::GatewayError};
use secrecy::SecretString;
use sqlx::FromRow;

#[derive(FromRow)]
struct CompanyRow {
    id: i64,
    name: String,
    contact_email: Option<String>,
    api_token: String,
    active: bool,
}

impl From<CompanyRow> for Company {
    fn from(r: CompanyRow) -> Self {
        Company {
            id: r.id,
            name: r.name,
            contact_email: r.contact_email,
            api_token: SecretString::from(r.api_token),
            active: r.active,
        }
    }
}

pub async fn find_by_id(pool: &sqlx::PgPool, company_id: i64) -> Result<Option<Company>, GatewayError> {
    let row: Option<CompanyRow> = sqlx::query_as(
        "SELECT id, name, contact_email, api_token, active FROM company WHERE id = $1",
    )
    .bind(company_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Company::from))
}
