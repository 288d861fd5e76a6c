//! In-memory control plane for tests.
//!
//! Objects are kept as JSON keyed by kind, namespace and name. The store
//! assigns `uid` and `resourceVersion`, rejects replaces carrying a stale
//! version, labels namespaces with `kubernetes.io/metadata.name` the way the
//! API server does, treats a RoleBinding's `roleRef` as immutable, and
//! cascades namespace deletion.

use super::{ApiObject, ControlPlane, DeleteOutcome, ResourceStore, TokenGrant};
use crate::error::{ErrorKind, ProvisionError, Result};
use chrono::Utc;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Resource, ResourceExt};
use secrecy::SecretString;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

type ObjectKey = (String, Option<String>, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Replace,
    Delete,
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub verb: Verb,
    pub kind: String,
    pub name: String,
}

struct Fault {
    verb: Verb,
    kind: String,
    error: ErrorKind,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    next_version: u64,
    writes: Vec<WriteRecord>,
    faults: Vec<Fault>,
    tokens_issued: u32,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_fault(&mut self, verb: Verb, kind: &str, name: &str) -> Result<()> {
        let position = self
            .faults
            .iter()
            .position(|f| f.verb == verb && f.kind == kind);
        match position {
            Some(index) => {
                let fault = self.faults.remove(index);
                Err(fault_error(fault.error, kind, name))
            }
            None => Ok(()),
        }
    }
}

fn fault_error(kind_of_error: ErrorKind, kind: &str, name: &str) -> ProvisionError {
    match kind_of_error {
        ErrorKind::Conflict => ProvisionError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            message: "the object has been modified".to_string(),
        },
        ErrorKind::Forbidden => ProvisionError::Forbidden {
            kind: kind.to_string(),
            name: name.to_string(),
            message: "forbidden by cluster policy".to_string(),
        },
        ErrorKind::Unauthorized => ProvisionError::Unauthorized("token expired".to_string()),
        _ => ProvisionError::Transport("connection refused".to_string()),
    }
}

/// Shared in-memory cluster. Clones observe the same state.
#[derive(Clone, Default)]
pub struct MemoryControlPlane {
    state: Arc<Mutex<State>>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `verb` on `kind` fail with an error of the given kind.
    pub fn inject_fault(&self, verb: Verb, kind: &str, error: ErrorKind) {
        self.lock().faults.push(Fault {
            verb,
            kind: kind.to_string(),
            error,
        });
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn tokens_issued(&self) -> u32 {
        self.lock().tokens_issued
    }

    /// Read an object directly, bypassing fault injection.
    pub fn object<K: ApiObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let key = (
            K::kind(&()).to_string(),
            namespace.map(str::to_string),
            name.to_string(),
        );
        self.lock()
            .objects
            .get(&key)
            .map(|value| serde_json::from_value(value.clone()).expect("stored object decodes"))
    }

    /// Overwrite an object as another actor would, bumping its version.
    /// Used to simulate drift.
    pub fn tamper<K: ApiObject>(&self, object: &K) {
        let key = (
            K::kind(&()).to_string(),
            object.namespace(),
            object.name_any(),
        );
        let mut state = self.lock();
        let version = state.bump_version();
        let mut value = serde_json::to_value(object).expect("object encodes");
        value["metadata"]["resourceVersion"] = Value::String(version);
        state.objects.insert(key, value);
    }
}

#[async_trait::async_trait]
impl ControlPlane for MemoryControlPlane {
    fn cluster_store<K>(&self) -> Box<dyn ResourceStore<K>>
    where
        K: ApiObject + Resource<Scope = ClusterResourceScope>,
    {
        Box::new(MemoryStore::<K>::new(self.state.clone(), None))
    }

    fn namespaced_store<K>(&self, namespace: &str) -> Box<dyn ResourceStore<K>>
    where
        K: ApiObject + Resource<Scope = NamespaceResourceScope>,
    {
        Box::new(MemoryStore::<K>::new(
            self.state.clone(),
            Some(namespace.to_string()),
        ))
    }

    async fn request_token(
        &self,
        namespace: &str,
        service_account: &str,
        expiration_seconds: i64,
    ) -> Result<TokenGrant> {
        let mut state = self.lock();
        state.take_fault(Verb::Create, "TokenRequest", service_account)?;

        let key = (
            ServiceAccount::kind(&()).to_string(),
            Some(namespace.to_string()),
            service_account.to_string(),
        );
        if !state.objects.contains_key(&key) {
            return Err(ProvisionError::NotFound {
                kind: "ServiceAccount".to_string(),
                name: service_account.to_string(),
            });
        }

        state.tokens_issued += 1;
        Ok(TokenGrant {
            token: SecretString::from(format!(
                "token-{}-{}",
                service_account, state.tokens_issued
            )),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(expiration_seconds)),
        })
    }
}

struct MemoryStore<K> {
    state: Arc<Mutex<State>>,
    namespace: Option<String>,
    kind: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ApiObject> MemoryStore<K> {
    fn new(state: Arc<Mutex<State>>, namespace: Option<String>) -> Self {
        Self {
            state,
            namespace,
            kind: K::kind(&()).to_string(),
            _kind: PhantomData,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(&self, name: &str) -> ObjectKey {
        (self.kind.clone(), self.namespace.clone(), name.to_string())
    }

    fn decode(value: &Value) -> Result<K> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

fn labels_match(value: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| {
            let (key, expected) = term.split_once('=').unwrap_or((term, ""));
            value["metadata"]["labels"][key].as_str() == Some(expected)
        })
}

#[async_trait::async_trait]
impl<K: ApiObject> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, name: &str) -> Result<Option<K>> {
        let mut state = self.lock();
        state.take_fault(Verb::Get, &self.kind, name)?;
        state
            .objects
            .get(&self.key(name))
            .map(Self::decode)
            .transpose()
    }

    async fn create(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        let mut state = self.lock();
        state.take_fault(Verb::Create, &self.kind, &name)?;

        let key = self.key(&name);
        if state.objects.contains_key(&key) {
            return Err(ProvisionError::Conflict {
                kind: self.kind.clone(),
                name,
                message: "already exists".to_string(),
            });
        }

        let version = state.bump_version();
        let mut value = serde_json::to_value(object)?;
        value["metadata"]["uid"] = Value::String(format!("uid-{}", version));
        value["metadata"]["resourceVersion"] = Value::String(version);
        if let Some(namespace) = &self.namespace {
            value["metadata"]["namespace"] = Value::String(namespace.clone());
        }
        if self.kind == "Namespace" {
            value["metadata"]["labels"]["kubernetes.io/metadata.name"] =
                Value::String(name.clone());
        }

        state.writes.push(WriteRecord {
            verb: Verb::Create,
            kind: self.kind.clone(),
            name,
        });
        state.objects.insert(key, value.clone());
        Self::decode(&value)
    }

    async fn replace(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        let mut state = self.lock();
        state.take_fault(Verb::Replace, &self.kind, &name)?;

        let key = self.key(&name);
        let mut value = serde_json::to_value(object)?;
        let stored_version = match state.objects.get(&key) {
            Some(stored) if self.kind == "RoleBinding" && stored["roleRef"] != value["roleRef"] => {
                return Err(ProvisionError::Rejected {
                    kind: self.kind.clone(),
                    name,
                    message: "cannot change roleRef (422)".to_string(),
                })
            }
            Some(stored) => stored["metadata"]["resourceVersion"]
                .as_str()
                .map(str::to_string),
            None => {
                return Err(ProvisionError::NotFound {
                    kind: self.kind.clone(),
                    name,
                })
            }
        };
        if object.meta().resource_version != stored_version {
            return Err(ProvisionError::Conflict {
                kind: self.kind.clone(),
                name,
                message: "the object has been modified".to_string(),
            });
        }

        let version = state.bump_version();
        value["metadata"]["resourceVersion"] = Value::String(version);

        state.writes.push(WriteRecord {
            verb: Verb::Replace,
            kind: self.kind.clone(),
            name,
        });
        state.objects.insert(key, value.clone());
        Self::decode(&value)
    }

    async fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        let mut state = self.lock();
        state.take_fault(Verb::Delete, &self.kind, name)?;

        if state.objects.remove(&self.key(name)).is_none() {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        if self.kind == "Namespace" {
            state
                .objects
                .retain(|(_, namespace, _), _| namespace.as_deref() != Some(name));
        }
        state.writes.push(WriteRecord {
            verb: Verb::Delete,
            kind: self.kind.clone(),
            name: name.to_string(),
        });
        Ok(DeleteOutcome::Deleted)
    }

    async fn list(&self, label_selector: Option<&str>) -> Result<Vec<K>> {
        let mut state = self.lock();
        state.take_fault(Verb::List, &self.kind, "*")?;

        state
            .objects
            .iter()
            .filter(|((kind, namespace, _), _)| {
                *kind == self.kind && *namespace == self.namespace
            })
            .filter(|(_, value)| label_selector.map_or(true, |s| labels_match(value, s)))
            .map(|(_, value)| Self::decode(value))
            .collect()
    }
}
