use log::debug;
use reqwest::{Client, Response};
use rocket::async_trait;
use shared::data::{Batch, NewRegistration, StoredRegistration};

use super::{RegistrationStore, StoreError, TABLE};

/// Talks to a hosted PostgREST endpoint (for example a Supabase project).
pub struct RestStore {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/{TABLE}", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Turns a non-success response into [`StoreError::Rejected`], preferring the
/// `message` PostgREST puts in its JSON error bodies.
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message: rejection_message(&body),
    })
}

fn rejection_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

#[async_trait]
impl RegistrationStore for RestStore {
    async fn insert_one(
        &self,
        registration: &NewRegistration,
    ) -> Result<StoredRegistration, StoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(&[registration])
            .send()
            .await?;

        let mut rows: Vec<StoredRegistration> = check(response).await?.json().await?;
        rows.pop().ok_or_else(|| StoreError::Rejected {
            status: 200,
            message: "The backend did not return the inserted row".into(),
        })
    }

    async fn select_by_batch(&self, batch: Batch) -> Result<Vec<StoredRegistration>, StoreError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[
                ("select", "*".to_owned()),
                ("lote", format!("eq.{batch}")),
                ("order", "created_at.desc".to_owned()),
            ])
            .send()
            .await?;

        let rows: Vec<StoredRegistration> = check(response).await?.json().await?;
        debug!("Fetched {} rows for batch {batch}", rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_targets_the_table_resource() {
        let store = RestStore::new("https://example.supabase.co/", "key").unwrap();
        assert_eq!(
            store.endpoint(),
            "https://example.supabase.co/rest/v1/pre_registros"
        );
    }

    #[test]
    fn rejection_message_prefers_postgrest_message() {
        assert_eq!(
            rejection_message(r#"{"code":"23505","message":"duplicate key value"}"#),
            "duplicate key value"
        );
        assert_eq!(rejection_message(" Bad Gateway \n"), "Bad Gateway");
    }
}
