use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde_json::{Map, Value};
use tracing::info;

use basis_auth::{AuthBackend, AuthContext, AuthError, SessionClaims, validate_session};
use basis_core::RecordId;
use basis_infra::base::ADMIN_ID;
use basis_infra::jobs::{self, MAIN_WORKER, PoolSlot, Worker};
use basis_infra::{AppConfig, BaseModels, ExecContext, InMemoryJobStore, MethodRegistry, SeedOptions, WorkerPool};

/// Open web sessions keyed by the `session_id` cookie value.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<String, SessionClaims>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `uid` and return its id.
    pub fn open(&self, uid: RecordId, login: &str, now: DateTime<Utc>) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let sid = hex::encode(bytes);
        let mut sessions = self.inner.write().unwrap_or_else(|p| p.into_inner());
        sessions.insert(sid.clone(), SessionClaims::issue(uid, login, now));
        sid
    }

    /// Live session for `sid`, with its expiry pushed forward. Expired
    /// sessions are dropped.
    pub fn resolve(&self, sid: &str, now: DateTime<Utc>) -> Option<SessionClaims> {
        let mut sessions = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let claims = sessions.get_mut(sid)?;
        if validate_session(claims, now).is_err() {
            sessions.remove(sid);
            return None;
        }
        claims.touch(now);
        Some(claims.clone())
    }

    pub fn close(&self, sid: &str) -> bool {
        let mut sessions = self.inner.write().unwrap_or_else(|p| p.into_inner());
        sessions.remove(sid).is_some()
    }

    /// Drop every session of `uid`.
    pub fn close_user(&self, uid: RecordId) -> usize {
        let mut sessions = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let before = sessions.len();
        sessions.retain(|_, claims| claims.uid != uid);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub models: Arc<BaseModels>,
    pub methods: Arc<MethodRegistry>,
    pub pool: Arc<WorkerPool>,
    pub sessions: SessionStore,
    auth: Box<dyn AuthBackend>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("pool", &self.pool)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl AppServices {
    /// Check credentials and open a session.
    pub fn login(&self, login: &str, password: &str, ctx: &AuthContext) -> Result<(String, RecordId), AuthError> {
        let uid = self.auth.authenticate(login, password, ctx)?;
        Ok((self.sessions.open(uid, login, Utc::now()), uid))
    }

    /// Method call context for `uid`: the user's own context overlaid with
    /// the client's.
    pub fn exec_context(&self, uid: RecordId, client: Option<&Map<String, Value>>) -> ExecContext {
        let mut context = self
            .models
            .users
            .get(uid)
            .map(|u| u.context())
            .unwrap_or_default();
        if let Some(client) = client {
            for (key, value) in client {
                context.insert(key.clone(), value.clone());
            }
        }
        ExecContext::new(uid, context)
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

/// Seed the base models, register every model method and start the `Main`
/// worker. Must run inside a tokio runtime.
pub fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let models = Arc::new(BaseModels::new());
    models.seed(&SeedOptions {
        admin_password: config.admin_password.clone(),
        ..SeedOptions::default()
    })?;

    let store = InMemoryJobStore::arc();
    let slot = PoolSlot::new();
    let mut registry = MethodRegistry::new(models.security.clone());
    models.register(&mut registry);
    jobs::rpc::register(&mut registry, store.clone(), slot.clone());
    let methods = Arc::new(registry);

    let defaults = Worker::new("default").with_pause_time(config.worker_pause);
    let pool = Arc::new(WorkerPool::new(store, methods.clone(), defaults)?);
    slot.bind(&pool);
    pool.start_worker(
        Worker::new(MAIN_WORKER)
            .with_max_threads(config.main_worker_threads)
            .with_pause_time(config.worker_pause),
    );

    info!(
        admin = %ADMIN_ID,
        models = methods.models().len(),
        "services ready"
    );

    Ok(AppServices {
        auth: Box::new(models.auth_backend()),
        models,
        methods,
        pool,
        sessions: SessionStore::new(),
    })
}
