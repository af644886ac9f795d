//! Supabase-backed collaborators.
//!
//! - [`SupabaseObjectStore`] uploads to Supabase Storage
//!   (`POST /storage/v1/object/{bucket}/{key}`) and hands out public bucket URLs.
//! - [`SupabaseRecordStore`] inserts rows through PostgREST
//!   (`POST /rest/v1/{table}`).
//!
//! Both share one [`SupabaseClient`], which holds the project URL, the API
//! key, and a pooled `reqwest::Client`.

use crate::{
    models::inspection::InspectionRecord,
    services::{
        object_store::{ObjectStore, StorageError, StorageResult},
        record_store::{PersistenceError, PersistenceResult, RecordStore},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use std::time::Duration;

/// Connection details shared by the Supabase stores.
#[derive(Clone, Debug)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url, api_key))
    }

    pub fn with_client(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

/// Object store backed by a Supabase Storage bucket.
#[derive(Clone, Debug)]
pub struct SupabaseObjectStore {
    client: SupabaseClient,
    bucket: String,
}

impl SupabaseObjectStore {
    pub fn new(client: SupabaseClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        let url = self
            .client
            .url(&format!("/storage/v1/object/{}/{}", self.bucket, key));
        let response = self
            .client
            .authorize(self.client.http.post(url))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status == StatusCode::CONFLICT || message.contains("Duplicate") {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        Err(StorageError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn public_url(&self, key: &str) -> String {
        self.client
            .url(&format!("/storage/v1/object/public/{}/{}", self.bucket, key))
    }
}

/// Record store backed by a PostgREST table.
#[derive(Clone, Debug)]
pub struct SupabaseRecordStore {
    client: SupabaseClient,
    table: String,
}

impl SupabaseRecordStore {
    pub fn new(client: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn table_url(&self) -> String {
        self.client.url(&format!("/rest/v1/{}", self.table))
    }
}

#[async_trait]
impl RecordStore for SupabaseRecordStore {
    async fn insert(&self, record: &InspectionRecord) -> PersistenceResult<()> {
        let response = self
            .client
            .authorize(self.client.http.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(PersistenceError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn ping(&self) -> PersistenceResult<()> {
        let response = self
            .client
            .authorize(self.client.http.get(self.table_url()))
            .query(&[("select", "*"), ("limit", "1")])
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PersistenceError::Rejected {
                status: status.as_u16(),
                message: format!("readiness query returned {}", status),
            })
        }
    }

    fn backend(&self) -> &'static str {
        "supabase"
    }
}
