//! Per-operation hook sets
//!
//! Each operation takes its own hook struct: optional `before`/`after`
//! functions with a signature tied to that lifecycle stage, plus flags that
//! override instance-level behaviour. Hooks receive the active session and
//! may issue further store calls on it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::EngineResult;
use crate::store::ClientSession;
use crate::value::Document;

/// Boxed future returned by a hook.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>>;

/// Receives a query, document data or a single document.
pub type DocumentHook =
    Arc<dyn for<'a> Fn(&'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync>;

/// Receives the documents a read returned.
pub type DocumentListHook =
    Arc<dyn for<'a> Fn(&'a mut Vec<Document>, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync>;

/// Receives the document a single-document operation produced, if any.
pub type MaybeDocumentHook = Arc<
    dyn for<'a> Fn(&'a mut Option<Document>, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync,
>;

/// Receives a count result.
pub type CountHook =
    Arc<dyn for<'a> Fn(&'a mut u64, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync>;

/// Receives the query and the document data of an update.
pub type UpdateHook = Arc<
    dyn for<'a> Fn(&'a mut Document, &'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a>
        + Send
        + Sync,
>;

/// Flags shared by every hook set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookFlags {
    /// `Some(true)` opens a session, `Some(false)` prevents one
    pub session_enabled: Option<bool>,
    /// Overrides the instance-level existence policy
    pub raise_document_existence_errors: Option<bool>,
    /// Skips persona redaction of returned documents
    pub keep_forbidden_fields: bool,
}

macro_rules! impl_hook_flags {
    ($($hooks:ty),+ $(,)?) => {$(
        impl $hooks {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn with_session(mut self, enabled: bool) -> Self {
                self.flags.session_enabled = Some(enabled);
                self
            }

            pub fn raise_document_existence_errors(mut self, raise: bool) -> Self {
                self.flags.raise_document_existence_errors = Some(raise);
                self
            }

            pub fn keep_forbidden_fields(mut self) -> Self {
                self.flags.keep_forbidden_fields = true;
                self
            }

            pub fn flags(&self) -> HookFlags {
                self.flags
            }
        }
    )+};
}

#[derive(Clone, Default)]
pub struct CountHooks {
    pub before_count: Option<DocumentHook>,
    pub after_count: Option<CountHook>,
    pub flags: HookFlags,
}

#[derive(Clone, Default)]
pub struct ReadHooks {
    pub before_read: Option<DocumentHook>,
    pub after_read: Option<DocumentListHook>,
    pub flags: HookFlags,
}

#[derive(Clone, Default)]
pub struct ReadOneHooks {
    pub before_read_one: Option<DocumentHook>,
    pub after_read_one: Option<MaybeDocumentHook>,
    pub flags: HookFlags,
}

#[derive(Clone, Default)]
pub struct CreateHooks {
    /// Receives the document data before it is stored
    pub before_create: Option<DocumentHook>,
    pub after_create: Option<DocumentHook>,
    pub flags: HookFlags,
}

#[derive(Clone, Default)]
pub struct UpdateHooks {
    pub before_update: Option<UpdateHook>,
    pub after_update: Option<MaybeDocumentHook>,
    pub flags: HookFlags,
}

/// Hooks for soft and hard deletes
#[derive(Clone, Default)]
pub struct DeleteHooks {
    pub before_delete: Option<DocumentHook>,
    pub after_delete: Option<MaybeDocumentHook>,
    pub flags: HookFlags,
}

impl_hook_flags!(CountHooks, ReadHooks, ReadOneHooks, CreateHooks, UpdateHooks, DeleteHooks);

impl CountHooks {
    pub fn before_count<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.before_count = Some(Arc::new(hook));
        self
    }

    pub fn after_count<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut u64, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.after_count = Some(Arc::new(hook));
        self
    }
}

impl ReadHooks {
    pub fn before_read<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.before_read = Some(Arc::new(hook));
        self
    }

    pub fn after_read<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Vec<Document>, Option<&'a ClientSession>) -> HookFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.after_read = Some(Arc::new(hook));
        self
    }
}

impl ReadOneHooks {
    pub fn before_read_one<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.before_read_one = Some(Arc::new(hook));
        self
    }

    pub fn after_read_one<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Option<Document>, Option<&'a ClientSession>) -> HookFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.after_read_one = Some(Arc::new(hook));
        self
    }
}

impl CreateHooks {
    pub fn before_create<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.before_create = Some(Arc::new(hook));
        self
    }

    pub fn after_create<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.after_create = Some(Arc::new(hook));
        self
    }
}

impl UpdateHooks {
    pub fn before_update<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, &'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.before_update = Some(Arc::new(hook));
        self
    }

    pub fn after_update<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Option<Document>, Option<&'a ClientSession>) -> HookFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.after_update = Some(Arc::new(hook));
        self
    }
}

impl DeleteHooks {
    pub fn before_delete<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Document, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync + 'static,
    {
        self.before_delete = Some(Arc::new(hook));
        self
    }

    pub fn after_delete<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut Option<Document>, Option<&'a ClientSession>) -> HookFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.after_delete = Some(Arc::new(hook));
        self
    }
}

/// Runs a hook if one is set.
pub(crate) async fn run_hook<T>(
    hook: &Option<Arc<dyn for<'a> Fn(&'a mut T, Option<&'a ClientSession>) -> HookFuture<'a> + Send + Sync>>,
    target: &mut T,
    session: Option<&ClientSession>,
) -> EngineResult<()>
where
    T: ?Sized,
{
    match hook {
        Some(hook) => hook(target, session).await,
        None => Ok(()),
    }
}
