//! Minimal Supabase client: PostgREST table access and auth user lookup.
//!
//! Every call carries two credentials: the project key in the `apikey`
//! header and a bearer token. The bearer decides which row-level policies
//! apply, so callers pass either the service-role key or an end user's
//! access token.

use std::time::Duration;

use reqwest::header::HeaderValue;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Secret;
use crate::store::StoreError;

/// The user record returned by `GET /auth/v1/user`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: Secret,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: Secret, timeout: Duration) -> Result<Self, StoreError> {
        if base_url.trim().is_empty() {
            return Err(StoreError::MissingCredential("store.url"));
        }
        if api_key.is_empty() {
            return Err(StoreError::MissingCredential("store api key"));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: Method, url: &str, token: &Secret) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", self.api_key.expose())
            .bearer_auth(token.expose())
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Insert rows without reading them back.
    pub async fn insert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        rows: &T,
        token: &Secret,
    ) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, &self.table_url(table), token)
            .header("Prefer", HeaderValue::from_static("return=minimal"))
            .json(rows)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Insert rows and return them as stored.
    pub async fn insert_returning<T, R>(
        &self,
        table: &str,
        rows: &T,
        token: &Secret,
    ) -> Result<Vec<R>, StoreError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, &self.table_url(table), token)
            .header("Prefer", HeaderValue::from_static("return=representation"))
            .json(rows)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// `query` uses PostgREST syntax, e.g. `[("user_id", "eq.<uuid>"), ("order", "date.desc")]`.
    pub async fn select<R: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
        token: &Secret,
    ) -> Result<Vec<R>, StoreError> {
        let response = self
            .request(Method::GET, &self.table_url(table), token)
            .query(&[("select", "*")])
            .query(query)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    pub async fn update<T, R>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        patch: &T,
        token: &Secret,
    ) -> Result<Vec<R>, StoreError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .request(Method::PATCH, &self.table_url(table), token)
            .header("Prefer", HeaderValue::from_static("return=representation"))
            .query(filter)
            .json(patch)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    pub async fn delete<R: DeserializeOwned>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        token: &Secret,
    ) -> Result<Vec<R>, StoreError> {
        let response = self
            .request(Method::DELETE, &self.table_url(table), token)
            .header("Prefer", HeaderValue::from_static("return=representation"))
            .query(filter)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Resolve the user that owns `access_token`.
    pub async fn get_user(&self, access_token: &Secret) -> Result<AuthUser, StoreError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self.request(Method::GET, &url, access_token).send().await?;
        Ok(check_status(response).await?.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<PostgrestErrorBody>(&body)
        .ok()
        .and_then(|e| e.message.or(e.msg))
        .unwrap_or(body);

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(StoreError::Unauthorized(message));
    }

    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}
