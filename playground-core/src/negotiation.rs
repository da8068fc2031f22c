//! # Dependency Negotiation
//!
//! When the relay cannot execute a call because schema imports or certificate files are
//! missing, the engine surfaces a [`MissingDependency`] instead of failing. The caller uploads
//! the missing material out-of-band and reports the upload result to a [`DependencyBridge`],
//! which wakes the paused call so that it re-sends itself.
//!
//! The bridge is owned by the application and injected into every call that should resume
//! automatically:
//!
//! ```rust,no_run
//! use playground_core::negotiation::DependencyBridge;
//! use std::sync::Arc;
//!
//! let bridge = Arc::new(DependencyBridge::new());
//! // RpcCall::new(relay, request).with_bridge(bridge.clone())
//! ```
use crate::call::FailureClass;
use crate::relay::{
    CertFile, Certificate, LoadCertStatus, LoadProtoStatus, PartialLoadBody, SchemaFile,
    UploadCertificateResponse, UploadProtoResponse,
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::oneshot;
use tracing::debug;

const PARTIAL_SCHEMA_STATUS: i32 = 0;
const PARTIAL_CERT_STATUS: i32 = 5;

/// Identity of the material a paused call is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyKey {
    /// Path of the schema file that declares the called service.
    Schema(String),
    /// Path of the root certificate file.
    Certificate(String),
}

impl DependencyKey {
    pub fn for_certificate(certificate: &Certificate) -> Self {
        Self::Certificate(certificate.root_cert.file_path.clone())
    }
}

/// A partial failure reported by the relay that needs caller action.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingDependency {
    Imports {
        files: Vec<SchemaFile>,
        message: Option<String>,
    },
    Certificates {
        files: Vec<CertFile>,
        /// The certificate the relay tried to load, when it reports one.
        certificate: Option<Certificate>,
        message: Option<String>,
    },
}

impl MissingDependency {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            MissingDependency::Imports { .. } => FailureClass::MissingImports,
            MissingDependency::Certificates { .. } => FailureClass::MissingCertificate,
        }
    }

    /// Decodes a send-request error body. Returns `None` unless the body reports a partial
    /// load with a non-empty list of missing files.
    pub fn from_partial_body(body: &[u8]) -> Option<Self> {
        let body: PartialLoadBody = serde_json::from_slice(body).ok()?;

        match body.status {
            PARTIAL_SCHEMA_STATUS => body
                .missing_imports
                .filter(|files| !files.is_empty())
                .map(|files| MissingDependency::Imports {
                    files,
                    message: body.message,
                }),
            PARTIAL_CERT_STATUS => body
                .missing_certs
                .filter(|files| !files.is_empty())
                .map(|files| MissingDependency::Certificates {
                    files,
                    certificate: body.certificate,
                    message: body.message,
                }),
            _ => None,
        }
    }
}

/// Waits for one [`DependencyBridge::notify_resolved`] call.
#[derive(Debug)]
pub struct DependencyListener {
    rx: oneshot::Receiver<()>,
}

impl DependencyListener {
    /// Resolves to `true` when the dependency was resolved, or `false` if this listener was
    /// replaced by a newer registration for the same key (or the bridge was dropped).
    pub async fn resolved(self) -> bool {
        self.rx.await.is_ok()
    }
}

#[derive(Debug, Default)]
struct Pending {
    imports: Vec<SchemaFile>,
    certs: Vec<CertFile>,
}

/// Registry of one-shot listeners keyed by [`DependencyKey`], plus the set of files the
/// relay still reports as missing.
#[derive(Debug, Default)]
pub struct DependencyBridge {
    listeners: Mutex<HashMap<DependencyKey, oneshot::Sender<()>>>,
    pending: Mutex<Pending>,
}

impl DependencyBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `key`. Any previous listener for the same key is dropped,
    /// and so are registrations whose listener no longer exists.
    pub fn register(&self, key: DependencyKey) -> DependencyListener {
        let (tx, rx) = oneshot::channel();

        let mut listeners = lock(&self.listeners);
        listeners.retain(|_, tx| !tx.is_closed());

        if listeners.insert(key.clone(), tx).is_some() {
            debug!(?key, "replaced pending dependency listener");
        }

        DependencyListener { rx }
    }

    /// Removes the registration for `key` once its listener has been dropped.
    ///
    /// A newer registration for the same key with a live listener is kept.
    pub fn release(&self, key: &DependencyKey) -> bool {
        let mut listeners = lock(&self.listeners);

        if listeners.get(key).is_some_and(|tx| tx.is_closed()) {
            listeners.remove(key);
            return true;
        }

        false
    }

    /// Keys that still have a registration, live or not yet released.
    pub fn registered_keys(&self) -> Vec<DependencyKey> {
        lock(&self.listeners).keys().cloned().collect()
    }

    pub fn has_listener(&self, key: &DependencyKey) -> bool {
        lock(&self.listeners)
            .get(key)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Fires and removes the listener for `key`. Returns whether a live listener was woken.
    pub fn notify_resolved(&self, key: &DependencyKey) -> bool {
        match lock(&self.listeners).remove(key) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Schema files the relay still reports as missing.
    pub fn missing_imports(&self) -> Vec<SchemaFile> {
        lock(&self.pending).imports.clone()
    }

    /// Certificate files the relay still reports as missing.
    pub fn missing_certificates(&self) -> Vec<CertFile> {
        lock(&self.pending).certs.clone()
    }

    /// Records the files of a [`MissingDependency`] as outstanding.
    pub fn record_missing(&self, missing: &MissingDependency) {
        let mut pending = lock(&self.pending);
        match missing {
            MissingDependency::Imports { files, .. } => {
                merge_by_path(&mut pending.imports, files, |f| &f.file_path)
            }
            MissingDependency::Certificates { files, .. } => {
                merge_by_path(&mut pending.certs, files, |f| &f.file_path)
            }
        }
    }

    /// Applies a schema upload result.
    ///
    /// Uploaded files stop being outstanding; a partial result adds its missing imports.
    /// When the upload succeeded and nothing is outstanding anymore, the listeners for the
    /// uploaded schema files are notified.
    ///
    /// # Returns
    ///
    /// The keys whose listeners were woken.
    pub fn apply_proto_upload(&self, response: &UploadProtoResponse) -> Vec<DependencyKey> {
        let uploaded: Vec<&str> = response
            .protos
            .iter()
            .flatten()
            .map(|p| p.proto.file_path.as_str())
            .collect();

        let nothing_outstanding = {
            let mut pending = lock(&self.pending);
            pending
                .imports
                .retain(|f| !uploaded.contains(&f.file_path.as_str()));

            if response.status == LoadProtoStatus::Part {
                if let Some(missing) = &response.missing_imports {
                    merge_by_path(&mut pending.imports, missing, |f| &f.file_path);
                }
            }

            pending.imports.is_empty()
        };

        if response.status != LoadProtoStatus::Ok || !nothing_outstanding {
            return Vec::new();
        }

        uploaded
            .into_iter()
            .map(|path| DependencyKey::Schema(path.to_string()))
            .filter(|key| self.notify_resolved(key))
            .collect()
    }

    /// Applies a certificate upload result. Same rules as [`Self::apply_proto_upload`]; the
    /// listener keyed by the uploaded certificate's root cert is notified.
    pub fn apply_certificate_upload(
        &self,
        response: &UploadCertificateResponse,
    ) -> Vec<DependencyKey> {
        let nothing_outstanding = {
            let mut pending = lock(&self.pending);

            if let Some(certs) = &response.certs {
                pending
                    .certs
                    .retain(|c| !certs.iter().any(|r| r.file_path == c.file_path));
            }

            if response.status == LoadCertStatus::Part {
                if let Some(missing) = &response.missing_certs {
                    merge_by_path(&mut pending.certs, missing, |f| &f.file_path);
                }
            }

            pending.certs.is_empty()
        };

        if response.status != LoadCertStatus::Ok || !nothing_outstanding {
            return Vec::new();
        }

        response
            .certificate
            .iter()
            .map(DependencyKey::for_certificate)
            .filter(|key| self.notify_resolved(key))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Appends files not yet present, comparing by path. Later duplicates replace earlier ones.
fn merge_by_path<T: Clone>(into: &mut Vec<T>, files: &[T], path: impl Fn(&T) -> &String) {
    for file in files {
        match into.iter_mut().find(|f| path(f) == path(file)) {
            Some(existing) => *existing = file.clone(),
            None => into.push(file.clone()),
        }
    }
}
