//! Process-wide handles shared by every request.

use crate::{
    config::{AppConfig, ObjectStoreKind, RecordStoreKind},
    services::{
        classifier::{Classifier, MockClassifier, RemoteClassifier},
        object_store::{LocalObjectStore, ObjectStore},
        pipeline::AnalyzePipeline,
        record_store::{RecordStore, SqliteRecordStore},
        supabase::{SupabaseClient, SupabaseObjectStore, SupabaseRecordStore},
    },
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalyzePipeline>,
    /// Directory in-flight uploads are staged to.
    pub staging_dir: PathBuf,
    /// Port reported by the health endpoints.
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Present when objects live on local disk and must be served by us.
    pub local_objects: Option<Arc<LocalObjectStore>>,
}

impl AppState {
    /// Build every collaborator named by `cfg`.
    ///
    /// The SQLite backend is migrated here, so a fresh database is usable
    /// without a separate `--migrate` run.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&cfg.staging_dir)
            .await
            .with_context(|| format!("creating staging dir {}", cfg.staging_dir.display()))?;

        let supabase = || -> Result<SupabaseClient> {
            let settings = cfg
                .supabase
                .as_ref()
                .context("supabase backend selected without SUPABASE_URL/SUPABASE_KEY")?;
            SupabaseClient::new(&settings.url, &settings.key, cfg.call_timeout)
                .context("building supabase HTTP client")
        };

        let mut local_objects = None;
        let objects: Arc<dyn ObjectStore> = match cfg.object_store {
            ObjectStoreKind::Local => {
                tokio::fs::create_dir_all(&cfg.storage_dir)
                    .await
                    .with_context(|| {
                        format!("creating storage dir {}", cfg.storage_dir.display())
                    })?;
                let store = Arc::new(LocalObjectStore::new(
                    cfg.storage_dir.clone(),
                    cfg.bucket.clone(),
                    cfg.public_base_url.clone(),
                ));
                local_objects = Some(store.clone());
                store
            }
            ObjectStoreKind::Supabase => {
                Arc::new(SupabaseObjectStore::new(supabase()?, cfg.bucket.clone()))
            }
        };

        let records: Arc<dyn RecordStore> = match cfg.record_store {
            RecordStoreKind::Sqlite => {
                let store = SqliteRecordStore::connect(&cfg.database_url)
                    .await
                    .with_context(|| format!("connecting to {}", cfg.database_url))?;
                store.migrate().await.context("migrating inspections schema")?;
                Arc::new(store)
            }
            RecordStoreKind::Supabase => {
                Arc::new(SupabaseRecordStore::new(supabase()?, cfg.table.clone()))
            }
        };

        let classifier: Arc<dyn Classifier> = match cfg.inference_url.as_deref() {
            Some(url) => Arc::new(
                RemoteClassifier::new(url, cfg.call_timeout)
                    .context("building inference HTTP client")?,
            ),
            None => Arc::new(MockClassifier::default()),
        };

        tracing::info!(
            object_store = ?cfg.object_store,
            record_store = records.backend(),
            classifier = classifier.name(),
            "collaborators ready"
        );

        Ok(Self {
            pipeline: Arc::new(AnalyzePipeline::new(
                objects,
                classifier,
                records,
                cfg.call_timeout,
            )),
            staging_dir: cfg.staging_dir.clone(),
            port: cfg.port,
            max_upload_bytes: cfg.max_upload_bytes,
            local_objects,
        })
    }
}
