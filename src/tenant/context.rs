//! Current tenant of the running unit of work.
//!
//! Each HTTP request and each message delivery runs inside [`scope`], which gives it a private
//! slot. Work spawned through [`spawn_inherited`] / [`spawn_blocking_inherited`] starts with a copy
//! of the spawner's value; writes in the child never reach the parent.
//!
//! Outside any task scope [`set_current_tenant`] has nothing to write to and is ignored. Sync
//! code that needs a tenant on its thread uses [`set_sync_tenant`], whose guard puts the previous
//! value back when dropped.

use super::DEFAULT_TENANT;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT_TENANT: RefCell<Option<String>>;
}

thread_local! {
    static SYNC_TENANT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Current tenant id, or [`DEFAULT_TENANT`] when none is set.
pub fn current_tenant() -> String {
    explicit_tenant().unwrap_or_else(|| DEFAULT_TENANT.to_string())
}

/// The scoped value as stored; `None` when cleared or never set. Outside a task scope this is
/// the thread's [`set_sync_tenant`] value.
pub fn explicit_tenant() -> Option<String> {
    CURRENT_TENANT
        .try_with(|slot| slot.borrow().clone())
        .unwrap_or_else(|_| SYNC_TENANT.with(|slot| slot.borrow().clone()))
}

/// Set the tenant of the enclosing [`scope`]. Without one the call is ignored.
pub fn set_current_tenant(tenant_id: impl Into<String>) {
    let tenant_id = tenant_id.into();
    tracing::debug!(tenant_id = %tenant_id, "tenant context set");
    if CURRENT_TENANT
        .try_with(move |slot| *slot.borrow_mut() = Some(tenant_id))
        .is_err()
    {
        tracing::warn!("tenant set outside a tenant scope; ignored");
    }
}

/// Stores an explicit [`DEFAULT_TENANT`] (as opposed to [`clear_current_tenant`], which leaves
/// the slot empty).
pub fn set_default_tenant() {
    set_current_tenant(DEFAULT_TENANT);
}

pub fn clear_current_tenant() {
    let _ = CURRENT_TENANT.try_with(|slot| slot.borrow_mut().take());
}

/// Tenant for synchronous code on this thread, until the guard is dropped.
pub fn set_sync_tenant(tenant_id: impl Into<String>) -> SyncTenantGuard {
    replace_sync_tenant(Some(tenant_id.into()))
}

fn replace_sync_tenant(tenant_id: Option<String>) -> SyncTenantGuard {
    let previous = SYNC_TENANT.with(|slot| slot.replace(tenant_id));
    SyncTenantGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Restores the thread's previous sync tenant on drop. Not `Send`, so it cannot be held across
/// an await in a spawned task.
#[must_use = "the sync tenant is restored as soon as the guard is dropped"]
pub struct SyncTenantGuard {
    previous: Option<String>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SyncTenantGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SYNC_TENANT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Run `future` with a fresh, empty tenant slot.
pub async fn scope<F>(future: F) -> F::Output
where
    F: Future,
{
    CURRENT_TENANT.scope(RefCell::new(None), future).await
}

/// Wrap `future` in a new slot seeded with the caller's current value.
pub fn inherit<F>(future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    CURRENT_TENANT.scope(RefCell::new(explicit_tenant()), future)
}

/// `tokio::spawn` that carries the caller's tenant into the new task.
pub fn spawn_inherited<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(inherit(future))
}

/// `tokio::task::spawn_blocking` that carries the caller's tenant onto the blocking thread.
/// The thread's previous value is restored afterwards (blocking threads are pooled).
pub fn spawn_blocking_inherited<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let inherited = explicit_tenant();
    tokio::task::spawn_blocking(move || {
        let _restore = replace_sync_tenant(inherited);
        f()
    })
}

/// Clears the current tenant when dropped, including on early return and unwinding.
#[must_use = "the tenant is cleared as soon as the guard is dropped"]
#[derive(Debug, Default)]
pub struct TenantGuard {
    _private: (),
}

impl TenantGuard {
    pub fn new() -> Self {
        TenantGuard { _private: () }
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        clear_current_tenant();
    }
}
