//! Typed registration of verification and expansion functions.
//!
//! Verification functions are plain closures. Their parameter shape is described by
//! [`FromBinding`] and their return shape by [`IntoReturned`]; both are resolved once,
//! when the closure is wrapped into a [`Verification`], so invocation never inspects
//! types at run time.
//!
//! ```rust,ignore
//! use livedoc::prelude::*;
//!
//! #[derive(serde::Deserialize)]
//! struct Greeting { name: String }
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     "HelloTest",
//!     "greet",
//!     vec![TestSpec::yaml("docs/**/*.yml").update_source(true)],
//!     Verification::blocking(|Payload(g): Payload<Greeting>| format!("Hello {}", g.name)),
//! )?;
//! ```
//!
//! Registry invariant: method names are unique per declaring type, and every
//! expansion function a spec names exists on the same declaring type.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::catalog::TestData;
use crate::config::TestSpec;
use crate::errors::{HarnessError, TestFailure};
use crate::tree::TreeValue;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What a verification function hands back: an optional value to write into the
/// document, or the reason it did not pass.
pub type Invocation = Result<Option<TreeValue>, TestFailure>;

// ============================================================================
// BINDING
// ============================================================================

/// Everything a verification or expansion function can bind for one case.
#[derive(Debug, Clone)]
pub struct Binding {
    pub data: TestData,
    /// Parsed payload; `Null` when the function does not bind it.
    pub value: TreeValue,
}

/// A parameter shape a function can be called with.
pub trait FromBinding: Sized + Send + 'static {
    /// Whether this shape needs the parsed payload. Payloads are only parsed for
    /// functions that bind them.
    fn binds_payload() -> bool {
        false
    }

    fn from_binding(binding: &Binding) -> Result<Self, TestFailure>;
}

impl FromBinding for () {
    fn from_binding(_binding: &Binding) -> Result<Self, TestFailure> {
        Ok(())
    }
}

impl FromBinding for TestData {
    fn from_binding(binding: &Binding) -> Result<Self, TestFailure> {
        Ok(binding.data.clone())
    }
}

impl FromBinding for TreeValue {
    fn binds_payload() -> bool {
        true
    }

    fn from_binding(binding: &Binding) -> Result<Self, TestFailure> {
        Ok(binding.value.clone())
    }
}

/// A payload deserialized into `T` through serde.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> FromBinding for Payload<T> {
    fn binds_payload() -> bool {
        true
    }

    fn from_binding(binding: &Binding) -> Result<Self, TestFailure> {
        Ok(Payload(binding.value.deserialize_into()?))
    }
}

impl<A: FromBinding, B: FromBinding> FromBinding for (A, B) {
    fn binds_payload() -> bool {
        A::binds_payload() || B::binds_payload()
    }

    fn from_binding(binding: &Binding) -> Result<Self, TestFailure> {
        Ok((A::from_binding(binding)?, B::from_binding(binding)?))
    }
}

// ============================================================================
// RETURN SHAPES
// ============================================================================

/// A return shape a verification function can produce.
pub trait IntoReturned: Send + 'static {
    fn into_returned(self) -> Invocation;
}

impl IntoReturned for () {
    fn into_returned(self) -> Invocation {
        Ok(None)
    }
}

impl IntoReturned for TreeValue {
    fn into_returned(self) -> Invocation {
        Ok(Some(self))
    }
}

impl IntoReturned for Option<TreeValue> {
    fn into_returned(self) -> Invocation {
        Ok(self)
    }
}

impl IntoReturned for String {
    fn into_returned(self) -> Invocation {
        Ok(Some(TreeValue::String(self)))
    }
}

impl IntoReturned for &'static str {
    fn into_returned(self) -> Invocation {
        Ok(Some(TreeValue::from(self)))
    }
}

/// Any serializable value, converted into a tree before it is returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Returned<T>(pub T);

impl<T: Serialize + Send + 'static> IntoReturned for Returned<T> {
    fn into_returned(self) -> Invocation {
        Ok(Some(TreeValue::from_serialize(&self.0)?))
    }
}

impl<R, E> IntoReturned for Result<R, E>
where
    R: IntoReturned,
    E: Into<TestFailure> + Send + 'static,
{
    fn into_returned(self) -> Invocation {
        match self {
            Ok(returned) => returned.into_returned(),
            Err(error) => Err(error.into()),
        }
    }
}

// ============================================================================
// VERIFICATION AND EXPANSION FUNCTIONS
// ============================================================================

type InvokeFn = dyn Fn(Binding) -> BoxFuture<Invocation> + Send + Sync;

/// A type-erased verification function.
#[derive(Clone)]
pub struct Verification {
    invoke: Arc<InvokeFn>,
    binds_payload: bool,
}

impl Verification {
    /// Wraps an asynchronous function. The returned future runs on the tokio pool.
    pub fn new<A, R, F, Fut>(function: F) -> Self
    where
        A: FromBinding,
        R: IntoReturned,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let function = Arc::new(function);
        Self {
            invoke: Arc::new(move |binding: Binding| -> BoxFuture<Invocation> {
                let function = Arc::clone(&function);
                Box::pin(async move {
                    let arg = A::from_binding(&binding)?;
                    (*function)(arg).await.into_returned()
                })
            }),
            binds_payload: A::binds_payload(),
        }
    }

    /// Wraps a synchronous function. It runs on tokio's blocking pool so a slow
    /// body never stalls the workers driving other cases.
    pub fn blocking<A, R, F>(function: F) -> Self
    where
        A: FromBinding,
        R: IntoReturned,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let function = Arc::new(function);
        Self {
            invoke: Arc::new(move |binding: Binding| -> BoxFuture<Invocation> {
                let function = Arc::clone(&function);
                Box::pin(async move {
                    let arg = A::from_binding(&binding)?;
                    tokio::task::spawn_blocking(move || (*function)(arg).into_returned())
                        .await
                        .unwrap_or_else(|e| Err(join_failure(e)))
                })
            }),
            binds_payload: A::binds_payload(),
        }
    }

    pub fn binds_payload(&self) -> bool {
        self.binds_payload
    }

    pub fn invoke(&self, binding: Binding) -> BoxFuture<Invocation> {
        (self.invoke)(binding)
    }
}

impl fmt::Debug for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verification")
            .field("binds_payload", &self.binds_payload)
            .finish_non_exhaustive()
    }
}

type ExpandFn = dyn Fn(&Binding) -> Result<Vec<String>, TestFailure> + Send + Sync;

/// A type-erased expansion function: one fragment in, matrix labels out.
#[derive(Clone)]
pub struct Expander {
    expand: Arc<ExpandFn>,
    binds_payload: bool,
}

impl Expander {
    pub fn new<A, I, F>(function: F) -> Self
    where
        A: FromBinding,
        I: IntoIterator,
        I::Item: Into<String>,
        F: Fn(A) -> I + Send + Sync + 'static,
    {
        Self {
            expand: Arc::new(move |binding: &Binding| {
                let arg = A::from_binding(binding)?;
                Ok(function(arg).into_iter().map(Into::into).collect())
            }),
            binds_payload: A::binds_payload(),
        }
    }

    pub fn binds_payload(&self) -> bool {
        self.binds_payload
    }

    pub fn expand(&self, binding: &Binding) -> Result<Vec<String>, TestFailure> {
        (self.expand)(binding)
    }
}

impl fmt::Debug for Expander {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expander")
            .field("binds_payload", &self.binds_payload)
            .finish_non_exhaustive()
    }
}

/// Converts a failed task join into a failure, keeping the panic payload text.
pub(crate) fn join_failure(error: tokio::task::JoinError) -> TestFailure {
    if !error.is_panic() {
        return TestFailure::fail("verification task was cancelled");
    }
    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "verification panicked".to_string());
    TestFailure::Failed {
        message: format!("panicked: {}", message),
        stack_trace: None,
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// A verification function together with its declarations.
#[derive(Debug, Clone)]
pub struct RegisteredMethod {
    pub declaring_type: String,
    pub name: String,
    /// One entry per declaration; the position is the case's attribute index.
    pub specs: Vec<TestSpec>,
    pub verification: Verification,
    /// Expansion function per spec, resolved at registration.
    pub expanders: Vec<Option<Expander>>,
}

impl RegisteredMethod {
    /// `<declaring_type>.<name>`, the prefix of every case's qualified name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }

    /// Whether running a case of the test spec at `attribute_index` needs its payload
    /// parsed, either for the verification function or for its expansion function.
    pub fn binds_payload(&self, attribute_index: usize) -> bool {
        self.verification.binds_payload()
            || self
                .expanders
                .get(attribute_index)
                .and_then(Option::as_ref)
                .is_some_and(Expander::binds_payload)
    }
}

/// All verification functions known to a harness.
#[derive(Debug, Default)]
pub struct Registry {
    methods: Vec<Arc<RegisteredMethod>>,
    expanders: HashMap<(String, String), Expander>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an expansion function under `declaring_type`. Register expanders
    /// before the methods that name them.
    pub fn register_expander(
        &mut self,
        declaring_type: &str,
        name: &str,
        expander: Expander,
    ) -> Result<&mut Self, HarnessError> {
        let key = (declaring_type.to_string(), name.to_string());
        if self.expanders.contains_key(&key) {
            return Err(HarnessError::registration(
                format!("expansion function '{}.{}' is already registered", declaring_type, name),
                None,
            ));
        }
        self.expanders.insert(key, expander);
        Ok(self)
    }

    pub fn register(
        &mut self,
        declaring_type: &str,
        method: &str,
        specs: Vec<TestSpec>,
        verification: Verification,
    ) -> Result<&mut Self, HarnessError> {
        if declaring_type.trim().is_empty() || method.trim().is_empty() {
            return Err(HarnessError::registration(
                "declaring type and method name must not be empty",
                None,
            ));
        }
        if method.contains(['.', '(']) {
            return Err(HarnessError::registration(
                format!("method name '{}' must not contain '.' or '('", method),
                None,
            ));
        }
        if specs.is_empty() {
            return Err(HarnessError::registration(
                format!("'{}.{}' declares no documents", declaring_type, method),
                Some("pass at least one TestSpec".to_string()),
            ));
        }
        if self.find(declaring_type, method).is_some() {
            return Err(HarnessError::registration(
                format!("'{}.{}' is already registered", declaring_type, method),
                None,
            ));
        }

        let mut expanders = Vec::with_capacity(specs.len());
        for spec in &specs {
            spec.validate()?;
            let expander = match &spec.expand {
                None => None,
                Some(name) => {
                    let key = (declaring_type.to_string(), name.clone());
                    let expander = self.expanders.get(&key).cloned().ok_or_else(|| {
                        HarnessError::registration(
                            format!(
                                "expansion function '{}' not found on '{}'",
                                name, declaring_type
                            ),
                            Some("register it with `register_expander` first".to_string()),
                        )
                    })?;
                    Some(expander)
                }
            };
            expanders.push(expander);
        }

        tracing::debug!(declaring_type, method, specs = specs.len(), "registered verification");
        self.methods.push(Arc::new(RegisteredMethod {
            declaring_type: declaring_type.to_string(),
            name: method.to_string(),
            specs,
            verification,
            expanders,
        }));
        Ok(self)
    }

    /// Registered methods in registration order.
    pub fn methods(&self) -> &[Arc<RegisteredMethod>] {
        &self.methods
    }

    pub fn find(&self, declaring_type: &str, method: &str) -> Option<&Arc<RegisteredMethod>> {
        self.methods
            .iter()
            .find(|m| m.declaring_type == declaring_type && m.name == method)
    }

    /// Looks a method up by its `<declaring_type>.<name>` form.
    pub fn find_by_full_name(&self, full_name: &str) -> Option<&Arc<RegisteredMethod>> {
        let (declaring_type, method) = full_name.rsplit_once('.')?;
        self.find(declaring_type, method)
    }
}
